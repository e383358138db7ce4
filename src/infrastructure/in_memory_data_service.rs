use crate::domain::models::{
    end_after, CalendarEvent, EventPatch, NewTask, Task, TaskPatch, TaskPosition,
};
use crate::infrastructure::data_service::PlannerDataService;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataOperation {
    ListTasks,
    CreateTask,
    UpdateTask,
    DeleteTask,
    ReorderTasks,
    ListEvents,
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
}

#[derive(Debug, Default)]
struct StoreState {
    tasks: Vec<Task>,
    events: Vec<CalendarEvent>,
    failing: HashSet<DataOperation>,
    calls: Vec<DataOperation>,
}

/// Process-local data service. Operations can be switched to fail so that
/// rollback paths can be driven without a network.
#[derive(Debug, Default)]
pub struct InMemoryPlannerDataService {
    state: Mutex<StoreState>,
    next_id: AtomicU64,
}

impl InMemoryPlannerDataService {
    pub fn with_records(tasks: Vec<Task>, events: Vec<CalendarEvent>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                tasks,
                events,
                ..StoreState::default()
            }),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn fail(&self, operation: DataOperation) {
        if let Ok(mut state) = self.state.lock() {
            state.failing.insert(operation);
        }
    }

    pub fn recover(&self, operation: DataOperation) {
        if let Ok(mut state) = self.state.lock() {
            state.failing.remove(&operation);
        }
    }

    pub fn calls(&self, operation: DataOperation) -> usize {
        self.state
            .lock()
            .map(|state| state.calls.iter().filter(|call| **call == operation).count())
            .unwrap_or(0)
    }

    pub fn stored_tasks(&self) -> Vec<Task> {
        self.state
            .lock()
            .map(|state| state.tasks.clone())
            .unwrap_or_default()
    }

    pub fn stored_events(&self) -> Vec<CalendarEvent> {
        self.state
            .lock()
            .map(|state| state.events.clone())
            .unwrap_or_default()
    }

    fn next_id(&self, prefix: &str) -> String {
        let sequence = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}-{sequence}")
    }

    fn begin(&self, operation: DataOperation) -> Result<MutexGuard<'_, StoreState>, InfraError> {
        let mut state = self
            .state
            .lock()
            .map_err(|error| InfraError::State(format!("in-memory data lock poisoned: {error}")))?;
        state.calls.push(operation);
        if state.failing.contains(&operation) {
            return Err(InfraError::Http(format!(
                "network error: {operation:?} unavailable"
            )));
        }
        Ok(state)
    }
}

#[async_trait]
impl PlannerDataService for InMemoryPlannerDataService {
    async fn list_tasks(&self) -> Result<Vec<Task>, InfraError> {
        let state = self.begin(DataOperation::ListTasks)?;
        Ok(state.tasks.clone())
    }

    async fn create_task(&self, fields: &NewTask) -> Result<Task, InfraError> {
        let id = self.next_id("task");
        let mut state = self.begin(DataOperation::CreateTask)?;
        let task = Task {
            id,
            title: fields.title.clone(),
            duration_minutes: fields.duration_minutes,
            section: fields.section,
            position: fields.position,
            scheduled: None,
            linked_event_id: None,
        };
        state.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, task_id: &str, fields: &TaskPatch) -> Result<Task, InfraError> {
        let mut state = self.begin(DataOperation::UpdateTask)?;
        let task = state
            .tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(|| InfraError::NotFound(format!("task {task_id}")))?;
        let released = match &fields.linked_event_id {
            Some(None) => task.linked_event_id.clone(),
            _ => None,
        };
        fields.apply_to(task);
        let updated = task.clone();
        if let Some(event_id) = released {
            state.events.retain(|event| event.id != event_id);
        }
        Ok(updated)
    }

    async fn delete_task(&self, task_id: &str) -> Result<(), InfraError> {
        let mut state = self.begin(DataOperation::DeleteTask)?;
        let before = state.tasks.len();
        state.tasks.retain(|task| task.id != task_id);
        if state.tasks.len() == before {
            return Err(InfraError::NotFound(format!("task {task_id}")));
        }
        Ok(())
    }

    async fn reorder_tasks(&self, positions: &[TaskPosition]) -> Result<(), InfraError> {
        let mut state = self.begin(DataOperation::ReorderTasks)?;
        for update in positions {
            if let Some(task) = state.tasks.iter_mut().find(|task| task.id == update.id) {
                task.section = update.section;
                task.position = update.position;
            }
        }
        Ok(())
    }

    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        let state = self.begin(DataOperation::ListEvents)?;
        Ok(state
            .events
            .iter()
            .filter(|event| event.end > time_min && event.start < time_max)
            .cloned()
            .collect())
    }

    async fn create_event(
        &self,
        task_id: &str,
        start: DateTime<Utc>,
    ) -> Result<CalendarEvent, InfraError> {
        let id = self.next_id("evt");
        let mut state = self.begin(DataOperation::CreateEvent)?;
        let task = state
            .tasks
            .iter()
            .find(|task| task.id == task_id)
            .ok_or_else(|| InfraError::NotFound(format!("task {task_id}")))?;
        let event = CalendarEvent {
            id,
            title: task.title.clone(),
            start,
            end: end_after(start, task.duration_minutes),
            is_external_origin: false,
            color_tag: None,
            linked_task_id: Some(task.id.clone()),
        };
        state.events.push(event.clone());
        Ok(event)
    }

    async fn update_event(
        &self,
        event_id: &str,
        fields: &EventPatch,
    ) -> Result<CalendarEvent, InfraError> {
        let mut state = self.begin(DataOperation::UpdateEvent)?;
        let event = state
            .events
            .iter_mut()
            .find(|event| event.id == event_id)
            .ok_or_else(|| InfraError::NotFound(format!("event {event_id}")))?;
        fields.apply_to(event);
        Ok(event.clone())
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), InfraError> {
        let mut state = self.begin(DataOperation::DeleteEvent)?;
        let before = state.events.len();
        state.events.retain(|event| event.id != event_id);
        if state.events.len() == before {
            return Err(InfraError::NotFound(format!("event {event_id}")));
        }
        Ok(())
    }
}
