use crate::application::{NowProvider, Settlement};
use crate::domain::models::{
    end_after, is_temporary_id, temp_event_id, CalendarEvent, NewTask, Section, Task, TaskPatch,
    TaskPosition,
};
use crate::domain::ordering::{compact_section, next_position, ordered_section, relocate_task};
use crate::infrastructure::data_service::PlannerDataService;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Owns the in-memory task collection and the optimistic protocol for it.
#[derive(Clone)]
pub struct TaskStore {
    data_service: Arc<dyn PlannerDataService>,
    tasks: Arc<Mutex<Vec<Task>>>,
    now_provider: NowProvider,
}

/// A schedule whose local half is applied. The network half runs once
/// [`PendingSchedule::dispatch`] is called, so the caller can place the
/// temporary event on the calendar first.
#[must_use = "the schedule is not persisted until dispatched"]
pub struct PendingSchedule {
    store: TaskStore,
    task_id: String,
    start: DateTime<Utc>,
    section: Section,
    previous_position: u32,
    temp_event: CalendarEvent,
}

/// A scheduled task whose start was moved locally to follow its event.
#[must_use = "the task start is not reconciled until it follows the event update"]
pub struct PendingReschedule {
    store: TaskStore,
    task_id: String,
    event_id: String,
    start: DateTime<Utc>,
    previous_start: DateTime<Utc>,
}

impl TaskStore {
    pub fn new(data_service: Arc<dyn PlannerDataService>) -> Self {
        Self {
            data_service,
            tasks: Arc::new(Mutex::new(Vec::new())),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Replaces the collection with the provider's tasks. Section positions are
    /// renumbered locally if the provider's have gaps.
    pub async fn load(&self) -> Result<Vec<Task>, InfraError> {
        let mut loaded = self
            .data_service
            .list_tasks()
            .await?
            .into_iter()
            .filter(|task| match task.validate() {
                Ok(()) => true,
                Err(reason) => {
                    warn!(task_id = %task.id, %reason, "skipping malformed task");
                    false
                }
            })
            .collect::<Vec<_>>();
        for section in Section::ALL {
            compact_section(&mut loaded, section);
        }
        *self.lock_tasks()? = loaded.clone();
        debug!(count = loaded.len(), "loaded tasks");
        Ok(loaded)
    }

    pub fn snapshot(&self) -> Result<Vec<Task>, InfraError> {
        Ok(self.lock_tasks()?.clone())
    }

    pub fn get(&self, task_id: &str) -> Result<Option<Task>, InfraError> {
        Ok(self
            .lock_tasks()?
            .iter()
            .find(|task| task.id == task_id)
            .cloned())
    }

    pub fn tasks_in_section(&self, section: Section) -> Result<Vec<Task>, InfraError> {
        Ok(ordered_section(&self.lock_tasks()?, section))
    }

    pub fn scheduled_tasks(&self) -> Result<Vec<Task>, InfraError> {
        Ok(self
            .lock_tasks()?
            .iter()
            .filter(|task| task.is_scheduled())
            .cloned()
            .collect())
    }

    pub async fn add(
        &self,
        title: &str,
        duration_minutes: u32,
        section: Section,
    ) -> Result<Task, InfraError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(InfraError::InvalidInput("title must not be empty".to_string()));
        }
        if duration_minutes == 0 {
            return Err(InfraError::InvalidInput(
                "duration must be > 0 minutes".to_string(),
            ));
        }

        let position = next_position(&self.lock_tasks()?, section);
        let created = self
            .data_service
            .create_task(&NewTask {
                title: title.to_string(),
                duration_minutes,
                section,
                position,
            })
            .await?;

        self.upsert_local(created.clone())?;
        info!(task_id = %created.id, %section, position, "added task");
        Ok(created)
    }

    pub async fn update_duration(
        &self,
        task_id: &str,
        duration_minutes: u32,
    ) -> Result<Task, InfraError> {
        if duration_minutes == 0 {
            return Err(InfraError::InvalidInput(
                "duration must be > 0 minutes".to_string(),
            ));
        }
        let patch = TaskPatch {
            duration_minutes: Some(duration_minutes),
            ..TaskPatch::default()
        };
        let updated = self.data_service.update_task(task_id, &patch).await?;
        self.merge_keeping_order(updated)
    }

    pub async fn update_title(&self, task_id: &str, title: &str) -> Result<Task, InfraError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(InfraError::InvalidInput("title must not be empty".to_string()));
        }
        let patch = TaskPatch {
            title: Some(title.to_string()),
            ..TaskPatch::default()
        };
        let updated = self.data_service.update_task(task_id, &patch).await?;
        self.merge_keeping_order(updated)
    }

    /// Deletes a task and closes the gap it leaves in its section. The new
    /// positions are pushed on a best-effort basis.
    pub async fn remove(&self, task_id: &str) -> Result<Option<Task>, InfraError> {
        self.data_service.delete_task(task_id).await?;
        let (removed, positions) = {
            let mut tasks = self.lock_tasks()?;
            let removed = tasks
                .iter()
                .position(|task| task.id == task_id)
                .map(|index| tasks.remove(index));
            let positions = match &removed {
                Some(task) if !task.is_scheduled() => compact_section(&mut tasks, task.section),
                _ => Vec::new(),
            };
            (removed, positions)
        };
        info!(task_id, "removed task");
        if positions.is_empty() {
            return Ok(removed);
        }

        if let Err(error) = self.data_service.reorder_tasks(&positions).await {
            warn!(task_id, %error, "position sync after remove failed");
        }
        Ok(removed)
    }

    /// Moves a task and pushes the new positions of both touched sections.
    /// Local state is kept even when the push fails.
    pub async fn reorder(
        &self,
        task_id: &str,
        to_section: Section,
        to_index: usize,
    ) -> Result<Vec<TaskPosition>, InfraError> {
        let positions = {
            let mut tasks = self.lock_tasks()?;
            let task = tasks
                .iter()
                .find(|task| task.id == task_id)
                .ok_or_else(|| InfraError::NotFound(format!("task {task_id}")))?;
            if task.is_scheduled() {
                return Err(InfraError::InvalidInput(format!(
                    "task {task_id} is scheduled; unschedule it to move it"
                )));
            }
            relocate_task(&mut tasks, task_id, to_section, to_index)
                .ok_or_else(|| InfraError::NotFound(format!("task {task_id}")))?
        };

        if let Err(error) = self.data_service.reorder_tasks(&positions).await {
            warn!(task_id, %to_section, %error, "reorder push failed; local order kept unsynced");
            return Err(error);
        }
        debug!(task_id, %to_section, to_index, updated = positions.len(), "reordered tasks");
        Ok(positions)
    }

    /// Marks the task scheduled under a temporary event id, closes the gap in
    /// its section and returns the matching temporary event. Nothing is sent
    /// until the result is dispatched.
    pub fn schedule_optimistic(
        &self,
        task_id: &str,
        start: DateTime<Utc>,
    ) -> Result<PendingSchedule, InfraError> {
        let mut tasks = self.lock_tasks()?;
        let task = tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(|| InfraError::NotFound(format!("task {task_id}")))?;
        if task.is_scheduled() {
            return Err(InfraError::InvalidInput(format!(
                "task {task_id} is already scheduled"
            )));
        }

        let temp_id = temp_event_id(task_id, (self.now_provider)());
        task.scheduled = Some(start);
        task.linked_event_id = Some(temp_id.clone());
        let section = task.section;
        let previous_position = task.position;

        let temp_event = CalendarEvent {
            id: temp_id,
            title: task.title.clone(),
            start,
            end: end_after(start, task.duration_minutes),
            is_external_origin: false,
            color_tag: None,
            linked_task_id: Some(task.id.clone()),
        };
        compact_section(&mut tasks, section);
        debug!(task_id, temp_id = %temp_event.id, "scheduled task locally");

        Ok(PendingSchedule {
            store: self.clone(),
            task_id: task_id.to_string(),
            start,
            section,
            previous_position,
            temp_event,
        })
    }

    /// Moves a scheduled task's start to `start` so it matches its event. The
    /// result follows the event update and puts the old start back if that
    /// update is rolled back.
    pub fn reschedule_optimistic(
        &self,
        task_id: &str,
        start: DateTime<Utc>,
    ) -> Result<PendingReschedule, InfraError> {
        let mut tasks = self.lock_tasks()?;
        let task = tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(|| InfraError::NotFound(format!("task {task_id}")))?;
        let (Some(previous_start), Some(event_id)) = (task.scheduled, task.linked_event_id.clone())
        else {
            return Err(InfraError::InvalidInput(format!(
                "task {task_id} is not scheduled"
            )));
        };
        if is_temporary_id(&event_id) {
            return Err(InfraError::PendingConfirmation(format!(
                "task {task_id} is still being scheduled"
            )));
        }
        task.scheduled = Some(start);
        debug!(task_id, event_id = %event_id, %start, "moved task start locally");

        Ok(PendingReschedule {
            store: self.clone(),
            task_id: task_id.to_string(),
            event_id,
            start,
            previous_start,
        })
    }

    /// Clears the schedule and relocates the task in one local step, then
    /// persists in the background. On failure the whole collection is put back
    /// and `on_rollback` receives the task as it was before the call.
    pub fn unschedule_and_move<R>(
        &self,
        task_id: &str,
        to_section: Section,
        to_index: usize,
        on_rollback: R,
    ) -> Result<JoinHandle<Settlement>, InfraError>
    where
        R: FnOnce(Task) + Send + 'static,
    {
        let (snapshot, original, patch, positions) = {
            let mut tasks = self.lock_tasks()?;
            let snapshot = tasks.clone();
            let task = tasks
                .iter_mut()
                .find(|task| task.id == task_id)
                .ok_or_else(|| InfraError::NotFound(format!("task {task_id}")))?;
            if task.linked_event_id.as_deref().is_some_and(is_temporary_id) {
                return Err(InfraError::PendingConfirmation(format!(
                    "task {task_id} is still being scheduled"
                )));
            }
            let original = task.clone();
            task.clear_schedule();

            let positions = relocate_task(&mut tasks, task_id, to_section, to_index)
                .ok_or_else(|| InfraError::NotFound(format!("task {task_id}")))?;
            let position = positions
                .iter()
                .find(|entry| entry.id == task_id)
                .map(|entry| entry.position)
                .unwrap_or_default();
            (
                snapshot,
                original,
                TaskPatch::unschedule_into(to_section, position),
                positions,
            )
        };

        let store = self.clone();
        let task_id = task_id.to_string();
        Ok(tokio::spawn(async move {
            let result = async {
                store.data_service.update_task(&task_id, &patch).await?;
                store.data_service.reorder_tasks(&positions).await
            }
            .await;

            match result {
                Ok(()) => {
                    debug!(task_id = %task_id, "unschedule confirmed");
                    Settlement::Confirmed
                }
                Err(error) => {
                    warn!(task_id = %task_id, %error, "unschedule failed; restoring tasks");
                    match store.tasks.lock() {
                        Ok(mut tasks) => *tasks = snapshot,
                        Err(poisoned) => *poisoned.into_inner() = snapshot,
                    }
                    on_rollback(original);
                    Settlement::RolledBack
                }
            }
        }))
    }

    /// Re-creates a deleted task under a new id in its old section, as close to
    /// its old position as the section now allows.
    pub async fn restore(&self, snapshot: &Task) -> Result<Task, InfraError> {
        let created = self
            .data_service
            .create_task(&NewTask {
                title: snapshot.title.clone(),
                duration_minutes: snapshot.duration_minutes,
                section: snapshot.section,
                position: snapshot.position,
            })
            .await?;
        self.upsert_local(created.clone())?;

        let positions = {
            let mut tasks = self.lock_tasks()?;
            relocate_task(
                &mut tasks,
                &created.id,
                snapshot.section,
                snapshot.position as usize,
            )
            .unwrap_or_default()
        };
        if let Err(error) = self.data_service.reorder_tasks(&positions).await {
            warn!(task_id = %created.id, %error, "position sync after restore failed");
        }

        info!(task_id = %created.id, previous_id = %snapshot.id, "restored task");
        Ok(self.get(&created.id)?.unwrap_or(created))
    }

    fn section_positions(&self, section: Section) -> Result<Vec<TaskPosition>, InfraError> {
        Ok(ordered_section(&self.lock_tasks()?, section)
            .into_iter()
            .map(|task| TaskPosition {
                id: task.id,
                section: task.section,
                position: task.position,
            })
            .collect())
    }

    /// Takes the provider's copy of a task but keeps the local section and
    /// position, which may hold moves not yet pushed.
    fn merge_keeping_order(&self, mut updated: Task) -> Result<Task, InfraError> {
        let mut tasks = self.lock_tasks()?;
        match tasks.iter_mut().find(|existing| existing.id == updated.id) {
            Some(existing) => {
                updated.section = existing.section;
                updated.position = existing.position;
                *existing = updated.clone();
            }
            None => {
                updated.position = next_position(&tasks, updated.section);
                tasks.push(updated.clone());
            }
        }
        Ok(updated)
    }

    fn upsert_local(&self, task: Task) -> Result<(), InfraError> {
        let mut tasks = self.lock_tasks()?;
        match tasks.iter_mut().find(|existing| existing.id == task.id) {
            Some(existing) => *existing = task,
            None => tasks.push(task),
        }
        Ok(())
    }

    fn lock_tasks(&self) -> Result<MutexGuard<'_, Vec<Task>>, InfraError> {
        self.tasks
            .lock()
            .map_err(|error| InfraError::State(format!("task store lock poisoned: {error}")))
    }
}

impl PendingSchedule {
    pub fn temp_event(&self) -> &CalendarEvent {
        &self.temp_event
    }

    /// Creates the provider event and attaches it to the task. `on_confirmed`
    /// receives the temporary id and the real event; `on_rollback` receives the
    /// temporary id after the task has been unscheduled again.
    pub fn dispatch<C, R>(self, on_confirmed: C, on_rollback: R) -> JoinHandle<Settlement>
    where
        C: FnOnce(String, CalendarEvent) + Send + 'static,
        R: FnOnce(String) + Send + 'static,
    {
        tokio::spawn(async move {
            let temp_id = self.temp_event.id.clone();
            match self.persist().await {
                Ok(real_event) => {
                    self.store
                        .confirm_schedule(&self.task_id, &temp_id, &real_event.id);
                    debug!(task_id = %self.task_id, temp_id = %temp_id, event_id = %real_event.id, "schedule confirmed");
                    self.sync_section().await;
                    on_confirmed(temp_id, real_event);
                    Settlement::Confirmed
                }
                Err(error) => {
                    warn!(task_id = %self.task_id, temp_id = %temp_id, %error, "schedule failed; reverting");
                    self.store
                        .revert_schedule(&self.task_id, &temp_id, self.previous_position);
                    on_rollback(temp_id);
                    Settlement::RolledBack
                }
            }
        })
    }

    async fn persist(&self) -> Result<CalendarEvent, InfraError> {
        let data_service = &self.store.data_service;
        let created = data_service.create_event(&self.task_id, self.start).await?;
        let patch = TaskPatch::schedule(self.start, &created.id);
        if let Err(error) = data_service.update_task(&self.task_id, &patch).await {
            if let Err(cleanup) = data_service.delete_event(&created.id).await {
                warn!(event_id = %created.id, error = %cleanup, "could not remove unattached event");
            }
            return Err(error);
        }
        Ok(created)
    }

    /// Pushes the section the task left, now that the provider agrees it is
    /// scheduled.
    async fn sync_section(&self) {
        let positions = match self.store.section_positions(self.section) {
            Ok(positions) => positions,
            Err(error) => {
                warn!(task_id = %self.task_id, %error, "could not read section positions");
                return;
            }
        };
        if positions.is_empty() {
            return;
        }
        if let Err(error) = self.store.data_service.reorder_tasks(&positions).await {
            warn!(task_id = %self.task_id, section = %self.section, %error, "position sync after schedule failed");
        }
    }
}

impl PendingReschedule {
    /// Waits for the event update. A confirmed move is persisted on the task;
    /// a rolled back one restores the previous start unless the task changed
    /// again in the meantime.
    pub fn follow(self, event_update: JoinHandle<Settlement>) -> JoinHandle<Settlement> {
        tokio::spawn(async move {
            let settlement = match event_update.await {
                Ok(settlement) => settlement,
                Err(error) => {
                    warn!(task_id = %self.task_id, %error, "event update task did not finish");
                    Settlement::RolledBack
                }
            };
            match settlement {
                Settlement::Confirmed => {
                    let patch = TaskPatch::schedule(self.start, &self.event_id);
                    let data_service = &self.store.data_service;
                    if let Err(error) = data_service.update_task(&self.task_id, &patch).await {
                        warn!(task_id = %self.task_id, %error, "task start sync failed; event start kept");
                    }
                    Settlement::Confirmed
                }
                Settlement::RolledBack => {
                    self.store.revert_start(
                        &self.task_id,
                        &self.event_id,
                        self.start,
                        self.previous_start,
                    );
                    Settlement::RolledBack
                }
            }
        })
    }
}

impl TaskStore {
    /// Swaps the temporary id for `real_id`. Skipped if the task has moved on
    /// since.
    fn confirm_schedule(&self, task_id: &str, temp_id: &str, real_id: &str) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        match find_pending(&mut tasks, task_id, temp_id) {
            Some(task) => task.linked_event_id = Some(real_id.to_string()),
            None => debug!(task_id, temp_id, "task changed while scheduling; leaving it as is"),
        }
    }

    /// Clears the schedule and puts the task back at `position` in its
    /// section. Skipped if the task has moved on since.
    fn revert_schedule(&self, task_id: &str, temp_id: &str, position: u32) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        let Some(task) = find_pending(&mut tasks, task_id, temp_id) else {
            debug!(task_id, temp_id, "task changed while scheduling; leaving it as is");
            return;
        };
        task.clear_schedule();
        let section = task.section;
        relocate_task(&mut tasks, task_id, section, position as usize);
    }

    fn revert_start(
        &self,
        task_id: &str,
        event_id: &str,
        start: DateTime<Utc>,
        previous_start: DateTime<Utc>,
    ) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        match tasks.iter_mut().find(|task| {
            task.id == task_id
                && task.scheduled == Some(start)
                && task.linked_event_id.as_deref() == Some(event_id)
        }) {
            Some(task) => task.scheduled = Some(previous_start),
            None => debug!(task_id, "task changed while its event moved; skipping rollback"),
        }
    }
}

fn find_pending<'a>(tasks: &'a mut [Task], task_id: &str, temp_id: &str) -> Option<&'a mut Task> {
    tasks
        .iter_mut()
        .find(|task| task.id == task_id && task.linked_event_id.as_deref() == Some(temp_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ordering::is_dense;
    use crate::infrastructure::in_memory_data_service::{
        DataOperation, InMemoryPlannerDataService,
    };
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn task(id: &str, section: Section, position: u32) -> Task {
        Task {
            id: id.to_string(),
            title: format!("Task {id}"),
            duration_minutes: 30,
            section,
            position,
            scheduled: None,
            linked_event_id: None,
        }
    }

    fn scheduled(id: &str, section: Section, position: u32, event_id: &str) -> Task {
        let mut task = task(id, section, position);
        task.scheduled = Some(fixed_time("2024-01-15T09:00:00Z"));
        task.linked_event_id = Some(event_id.to_string());
        task
    }

    async fn seeded(tasks: Vec<Task>) -> (Arc<InMemoryPlannerDataService>, TaskStore) {
        let service = Arc::new(InMemoryPlannerDataService::with_records(tasks, Vec::new()));
        let store = TaskStore::new(service.clone())
            .with_now_provider(Arc::new(|| fixed_time("2024-01-01T00:00:00Z")));
        store.load().await.expect("load tasks");
        (service, store)
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.id.as_str()).collect()
    }

    #[tokio::test]
    async fn load_skips_half_scheduled_records() {
        let mut broken = task("broken", Section::Inbox, 1);
        broken.linked_event_id = Some("evt-1".to_string());
        let (_service, store) = seeded(vec![task("a", Section::Inbox, 0), broken]).await;

        assert_eq!(ids(&store.snapshot().expect("snapshot")), vec!["a"]);
    }

    #[tokio::test]
    async fn add_appends_to_section_end() {
        let (service, store) =
            seeded(vec![task("a", Section::Inbox, 0), task("b", Section::Inbox, 1)]).await;

        let created = store
            .add("  Call plumber ", 15, Section::Inbox)
            .await
            .expect("add task");

        assert_eq!(created.title, "Call plumber");
        assert_eq!(created.position, 2);
        assert_eq!(store.tasks_in_section(Section::Inbox).expect("section").len(), 3);
        assert_eq!(service.stored_tasks().len(), 3);
    }

    #[tokio::test]
    async fn add_failure_propagates_without_local_change() {
        let (service, store) = seeded(vec![]).await;
        service.fail(DataOperation::CreateTask);

        assert!(store.add("Call plumber", 15, Section::Inbox).await.is_err());
        assert!(store.snapshot().expect("snapshot").is_empty());
        assert!(store.add("   ", 15, Section::Inbox).await.is_err());
    }

    #[tokio::test]
    async fn title_and_duration_reflect_confirmed_state_only() {
        let (service, store) = seeded(vec![task("a", Section::Inbox, 0)]).await;

        let updated = store.update_duration("a", 90).await.expect("update duration");
        assert_eq!(updated.duration_minutes, 90);

        service.fail(DataOperation::UpdateTask);
        assert!(store.update_title("a", "Renamed").await.is_err());
        let local = store.get("a").expect("get").expect("task exists");
        assert_eq!(local.title, "Task a");
        assert_eq!(local.duration_minutes, 90);
    }

    #[tokio::test]
    async fn remove_deletes_remotely_then_locally() {
        let (service, store) = seeded(vec![task("a", Section::Inbox, 0)]).await;
        service.fail(DataOperation::DeleteTask);
        assert!(store.remove("a").await.is_err());
        assert!(store.get("a").expect("get").is_some());

        service.recover(DataOperation::DeleteTask);
        let removed = store.remove("a").await.expect("remove");
        assert_eq!(removed.map(|task| task.id), Some("a".to_string()));
        assert!(store.snapshot().expect("snapshot").is_empty());
    }

    #[tokio::test]
    async fn reorder_drag_down_inserts_after_target() {
        let tasks = (0..8)
            .map(|position| task(&format!("t{position}"), Section::MustDo, position))
            .collect();
        let (service, store) = seeded(tasks).await;

        store.reorder("t2", Section::MustDo, 6).await.expect("reorder");

        let moved = store.get("t2").expect("get").expect("task exists");
        assert_eq!(moved.position, 6);
        let stored = service.stored_tasks();
        let remote = stored.iter().find(|task| task.id == "t2").expect("stored");
        assert_eq!(remote.position, 6);
    }

    #[tokio::test]
    async fn reorder_drag_up_shifts_following_tasks() {
        let tasks = (0..6)
            .map(|position| task(&format!("t{position}"), Section::MustDo, position))
            .collect();
        let (_service, store) = seeded(tasks).await;

        store.reorder("t5", Section::MustDo, 2).await.expect("reorder");

        let section = store.tasks_in_section(Section::MustDo).expect("section");
        assert_eq!(ids(&section), vec!["t0", "t1", "t5", "t2", "t3", "t4"]);
        for (position, task) in section.iter().enumerate() {
            assert_eq!(task.position as usize, position);
        }
    }

    #[tokio::test]
    async fn reorder_failure_keeps_local_order() {
        let (service, store) =
            seeded(vec![task("a", Section::Inbox, 0), task("b", Section::Inbox, 1)]).await;
        service.fail(DataOperation::ReorderTasks);

        assert!(store.reorder("a", Section::Later, usize::MAX).await.is_err());

        let local = store.get("a").expect("get").expect("task exists");
        assert_eq!(local.section, Section::Later);
        assert!(is_dense(&store.snapshot().expect("snapshot"), Section::Inbox));
    }

    #[tokio::test]
    async fn schedule_confirms_with_real_event_id() {
        let (service, store) = seeded(vec![task("a", Section::Inbox, 0)]).await;
        let start = fixed_time("2024-01-15T10:30:00Z");

        let pending = store.schedule_optimistic("a", start).expect("schedule");
        let temp = pending.temp_event().clone();
        assert_eq!(temp.id, "temp-a-1704067200000");
        assert_eq!(temp.end, fixed_time("2024-01-15T11:00:00Z"));
        let local = store.get("a").expect("get").expect("task exists");
        assert_eq!(local.linked_event_id.as_deref(), Some(temp.id.as_str()));
        assert_eq!(local.scheduled, Some(start));

        let confirmed = Arc::new(Mutex::new(None));
        let confirmed_sink = Arc::clone(&confirmed);
        let settlement = pending
            .dispatch(
                move |temp_id, real| {
                    *confirmed_sink.lock().expect("sink") = Some((temp_id, real));
                },
                |_| panic!("must not roll back"),
            )
            .await
            .expect("join");

        assert_eq!(settlement, Settlement::Confirmed);
        let (temp_id, real) = confirmed.lock().expect("sink").clone().expect("confirmed");
        assert_eq!(temp_id, temp.id);
        let local = store.get("a").expect("get").expect("task exists");
        assert_eq!(local.linked_event_id.as_deref(), Some(real.id.as_str()));
        assert_eq!(service.stored_events().len(), 1);
    }

    #[tokio::test]
    async fn schedule_rolls_back_when_event_creation_fails() {
        let (service, store) = seeded(vec![task("a", Section::Inbox, 0)]).await;
        service.fail(DataOperation::CreateEvent);

        let pending = store
            .schedule_optimistic("a", fixed_time("2024-01-15T10:30:00Z"))
            .expect("schedule");
        let rolled_back = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&rolled_back);
        let settlement = pending
            .dispatch(
                |_, _| panic!("must not confirm"),
                move |_| flag.store(true, Ordering::SeqCst),
            )
            .await
            .expect("join");

        assert_eq!(settlement, Settlement::RolledBack);
        assert!(rolled_back.load(Ordering::SeqCst));
        let local = store.get("a").expect("get").expect("task exists");
        assert_eq!(local.scheduled, None);
        assert_eq!(local.linked_event_id, None);
    }

    #[tokio::test]
    async fn schedule_rollback_removes_unattached_provider_event() {
        let (service, store) = seeded(vec![task("a", Section::Inbox, 0)]).await;
        service.fail(DataOperation::UpdateTask);

        let settlement = store
            .schedule_optimistic("a", fixed_time("2024-01-15T10:30:00Z"))
            .expect("schedule")
            .dispatch(|_, _| {}, |_| {})
            .await
            .expect("join");

        assert_eq!(settlement, Settlement::RolledBack);
        assert!(service.stored_events().is_empty());
        assert!(!store.get("a").expect("get").expect("task").is_scheduled());
    }

    #[tokio::test]
    async fn scheduling_twice_is_rejected() {
        let (_service, store) = seeded(vec![scheduled("a", Section::Inbox, 0, "evt-1")]).await;
        assert!(matches!(
            store.schedule_optimistic("a", fixed_time("2024-01-15T10:30:00Z")),
            Err(InfraError::InvalidInput(_))
        ));
        assert!(matches!(
            store.schedule_optimistic("missing", fixed_time("2024-01-15T10:30:00Z")),
            Err(InfraError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unschedule_and_move_applies_locally_before_network() {
        let (service, store) = seeded(vec![
            scheduled("s", Section::Inbox, 0, "evt-1"),
            task("m0", Section::MustDo, 0),
            task("m1", Section::MustDo, 1),
        ])
        .await;

        let handle = store
            .unschedule_and_move("s", Section::MustDo, 1, |_| panic!("must not roll back"))
            .expect("unschedule");

        let local = store.get("s").expect("get").expect("task exists");
        assert!(!local.is_scheduled());
        assert_eq!(local.section, Section::MustDo);
        assert_eq!(local.position, 1);
        assert_eq!(
            ids(&store.tasks_in_section(Section::MustDo).expect("section")),
            vec!["m0", "s", "m1"]
        );

        assert_eq!(handle.await.expect("join"), Settlement::Confirmed);
        let stored = service.stored_tasks();
        let remote = stored.iter().find(|task| task.id == "s").expect("stored");
        assert_eq!(remote.section, Section::MustDo);
        assert_eq!(remote.linked_event_id, None);
    }

    #[tokio::test]
    async fn unschedule_failure_restores_whole_collection() {
        let before = vec![
            scheduled("s", Section::Inbox, 0, "evt-1"),
            task("m0", Section::MustDo, 0),
            task("m1", Section::MustDo, 1),
        ];
        let (service, store) = seeded(before.clone()).await;
        service.fail(DataOperation::ReorderTasks);

        let restored_task = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&restored_task);
        let settlement = store
            .unschedule_and_move("s", Section::MustDo, 0, move |original| {
                *sink.lock().expect("sink") = Some(original);
            })
            .expect("unschedule")
            .await
            .expect("join");

        assert_eq!(settlement, Settlement::RolledBack);
        assert_eq!(store.snapshot().expect("snapshot"), before);
        let original = restored_task.lock().expect("sink").clone().expect("rollback ran");
        assert_eq!(original.linked_event_id.as_deref(), Some("evt-1"));
    }

    #[tokio::test]
    async fn unschedule_refuses_tasks_awaiting_confirmation() {
        let (_service, store) = seeded(vec![task("a", Section::Inbox, 0)]).await;
        let _pending = store
            .schedule_optimistic("a", fixed_time("2024-01-15T10:30:00Z"))
            .expect("schedule");

        assert!(matches!(
            store.unschedule_and_move("a", Section::Later, 0, |_| {}),
            Err(InfraError::PendingConfirmation(_))
        ));
    }

    #[tokio::test]
    async fn schedule_closes_gap_and_rollback_reopens_it() {
        let (service, store) = seeded(vec![
            task("a", Section::Inbox, 0),
            task("b", Section::Inbox, 1),
            task("c", Section::Inbox, 2),
        ])
        .await;
        let start = fixed_time("2024-01-15T10:00:00Z");

        let pending = store.schedule_optimistic("b", start).expect("schedule");
        let inbox = store.tasks_in_section(Section::Inbox).expect("section");
        assert_eq!(ids(&inbox), vec!["a", "c"]);
        assert!(is_dense(&store.snapshot().expect("snapshot"), Section::Inbox));
        let added = store.add("d", 15, Section::Inbox).await.expect("add");
        assert_eq!(added.position, 2);

        service.fail(DataOperation::CreateEvent);
        let settlement = pending.dispatch(|_, _| {}, |_| {}).await.expect("join");

        assert_eq!(settlement, Settlement::RolledBack);
        let inbox = store.tasks_in_section(Section::Inbox).expect("section");
        assert_eq!(ids(&inbox), vec!["a", "b", "c", added.id.as_str()]);
        assert!(is_dense(&store.snapshot().expect("snapshot"), Section::Inbox));
    }

    #[tokio::test]
    async fn confirmed_schedule_pushes_closed_section() {
        let (service, store) = seeded(vec![
            task("a", Section::Inbox, 0),
            task("b", Section::Inbox, 1),
            task("c", Section::Inbox, 2),
        ])
        .await;

        let settlement = store
            .schedule_optimistic("a", fixed_time("2024-01-15T10:00:00Z"))
            .expect("schedule")
            .dispatch(|_, _| {}, |_| {})
            .await
            .expect("join");

        assert_eq!(settlement, Settlement::Confirmed);
        let stored = service.stored_tasks();
        let remote = |id: &str| stored.iter().find(|task| task.id == id).expect("stored").position;
        assert_eq!((remote("b"), remote("c")), (0, 1));
    }

    #[tokio::test]
    async fn remove_closes_gap_in_section() {
        let (service, store) = seeded(vec![
            task("a", Section::Inbox, 0),
            task("b", Section::Inbox, 1),
            task("c", Section::Inbox, 2),
        ])
        .await;

        store.remove("b").await.expect("remove");

        let inbox = store.tasks_in_section(Section::Inbox).expect("section");
        assert_eq!(ids(&inbox), vec!["a", "c"]);
        assert_eq!(inbox[1].position, 1);
        let stored = service.stored_tasks();
        let remote = stored.iter().find(|task| task.id == "c").expect("stored");
        assert_eq!(remote.position, 1);
        let added = store.add("d", 15, Section::Inbox).await.expect("add");
        assert_eq!(added.position, 2);
    }

    #[tokio::test]
    async fn load_renumbers_sections_with_gaps() {
        let (_service, store) =
            seeded(vec![task("a", Section::Later, 3), task("b", Section::Later, 7)]).await;

        let later = store.tasks_in_section(Section::Later).expect("section");
        assert_eq!(ids(&later), vec!["a", "b"]);
        assert_eq!((later[0].position, later[1].position), (0, 1));
    }

    #[tokio::test]
    async fn reorder_refuses_scheduled_tasks() {
        let (service, store) = seeded(vec![
            scheduled("s", Section::Later, 0, "evt-1"),
            task("a", Section::Later, 0),
        ])
        .await;

        assert!(matches!(
            store.reorder("s", Section::Later, 0).await,
            Err(InfraError::InvalidInput(_))
        ));
        assert_eq!(service.calls(DataOperation::ReorderTasks), 0);
        assert!(store.get("s").expect("get").expect("task").is_scheduled());
    }

    #[tokio::test]
    async fn reschedule_follows_confirmed_event_update() {
        let (service, store) = seeded(vec![scheduled("s", Section::Inbox, 0, "evt-1")]).await;
        let start = fixed_time("2024-01-16T13:00:00Z");

        let pending = store.reschedule_optimistic("s", start).expect("reschedule");
        assert_eq!(store.get("s").expect("get").expect("task").scheduled, Some(start));

        let settlement = pending
            .follow(tokio::spawn(async { Settlement::Confirmed }))
            .await
            .expect("join");

        assert_eq!(settlement, Settlement::Confirmed);
        let stored = service.stored_tasks();
        let remote = stored.iter().find(|task| task.id == "s").expect("stored");
        assert_eq!(remote.scheduled, Some(start));
        assert_eq!(remote.linked_event_id.as_deref(), Some("evt-1"));
    }

    #[tokio::test]
    async fn reschedule_reverts_when_event_update_rolls_back() {
        let (service, store) = seeded(vec![scheduled("s", Section::Inbox, 0, "evt-1")]).await;

        let settlement = store
            .reschedule_optimistic("s", fixed_time("2024-01-16T13:00:00Z"))
            .expect("reschedule")
            .follow(tokio::spawn(async { Settlement::RolledBack }))
            .await
            .expect("join");

        assert_eq!(settlement, Settlement::RolledBack);
        let local = store.get("s").expect("get").expect("task");
        assert_eq!(local.scheduled, Some(fixed_time("2024-01-15T09:00:00Z")));
        assert_eq!(service.calls(DataOperation::UpdateTask), 0);
        assert!(matches!(
            store.reschedule_optimistic("missing", fixed_time("2024-01-16T13:00:00Z")),
            Err(InfraError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn restore_recreates_in_same_section_with_new_id() {
        let (_service, store) = seeded(vec![
            task("a", Section::Later, 0),
            task("b", Section::Later, 1),
        ])
        .await;
        let deleted = task("gone", Section::Later, 1);

        let restored = store.restore(&deleted).await.expect("restore");

        assert_ne!(restored.id, "gone");
        assert_eq!(restored.section, Section::Later);
        assert_eq!(restored.position, 1);
        assert_eq!(restored.title, deleted.title);
        assert!(is_dense(&store.snapshot().expect("snapshot"), Section::Later));
    }

    #[derive(Debug, Clone)]
    enum StoreOp {
        Add(Section),
        Schedule { pick: usize, fail: bool },
        Remove(usize),
        Reorder { pick: usize, section: Section, index: usize },
        Unschedule { pick: usize, section: Section, index: usize, fail: bool },
    }

    fn store_op() -> impl Strategy<Value = StoreOp> {
        let section = || prop::sample::select(Section::ALL.to_vec());
        prop_oneof![
            section().prop_map(StoreOp::Add),
            (any::<usize>(), any::<bool>())
                .prop_map(|(pick, fail)| StoreOp::Schedule { pick, fail }),
            any::<usize>().prop_map(StoreOp::Remove),
            (any::<usize>(), section(), 0usize..8).prop_map(|(pick, section, index)| {
                StoreOp::Reorder { pick, section, index }
            }),
            (any::<usize>(), section(), 0usize..8, any::<bool>()).prop_map(
                |(pick, section, index, fail)| StoreOp::Unschedule {
                    pick,
                    section,
                    index,
                    fail,
                }
            ),
        ]
    }

    fn pick_task(tasks: &[Task], pick: usize, scheduled: Option<bool>) -> Option<String> {
        let candidates = tasks
            .iter()
            .filter(|task| scheduled.is_none_or(|wanted| task.is_scheduled() == wanted))
            .collect::<Vec<_>>();
        (!candidates.is_empty()).then(|| candidates[pick % candidates.len()].id.clone())
    }

    async fn apply_op(service: &InMemoryPlannerDataService, store: &TaskStore, op: StoreOp) {
        let tasks = store.snapshot().expect("snapshot");
        match op {
            StoreOp::Add(section) => {
                store.add("generated", 15, section).await.expect("add");
            }
            StoreOp::Schedule { pick, fail } => {
                let Some(task_id) = pick_task(&tasks, pick, Some(false)) else {
                    return;
                };
                if fail {
                    service.fail(DataOperation::CreateEvent);
                }
                store
                    .schedule_optimistic(&task_id, fixed_time("2024-01-15T10:00:00Z"))
                    .expect("schedule")
                    .dispatch(|_, _| {}, |_| {})
                    .await
                    .expect("join");
                service.recover(DataOperation::CreateEvent);
            }
            StoreOp::Remove(pick) => {
                let Some(task_id) = pick_task(&tasks, pick, None) else {
                    return;
                };
                store.remove(&task_id).await.expect("remove");
            }
            StoreOp::Reorder {
                pick,
                section,
                index,
            } => {
                let Some(task_id) = pick_task(&tasks, pick, Some(false)) else {
                    return;
                };
                store.reorder(&task_id, section, index).await.expect("reorder");
            }
            StoreOp::Unschedule {
                pick,
                section,
                index,
                fail,
            } => {
                let Some(task_id) = pick_task(&tasks, pick, Some(true)) else {
                    return;
                };
                if fail {
                    service.fail(DataOperation::ReorderTasks);
                }
                store
                    .unschedule_and_move(&task_id, section, index, |_| {})
                    .expect("unschedule")
                    .await
                    .expect("join");
                service.recover(DataOperation::ReorderTasks);
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]
        #[test]
        fn sections_stay_dense_across_store_operations(
            ops in prop::collection::vec(store_op(), 1..30)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");
            runtime.block_on(async {
                let (service, store) = seeded(vec![
                    task("a", Section::Inbox, 0),
                    task("b", Section::Inbox, 1),
                    task("c", Section::MustDo, 0),
                    scheduled("s", Section::Later, 0, "evt-1"),
                ])
                .await;
                for op in ops {
                    apply_op(&service, &store, op.clone()).await;
                    let tasks = store.snapshot().expect("snapshot");
                    for section in Section::ALL {
                        assert!(is_dense(&tasks, section), "{section} has gaps after {op:?}");
                    }
                }
            });
        }
    }
}
