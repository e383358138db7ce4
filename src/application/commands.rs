use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::calendar_store::CalendarStore;
use crate::application::task_store::TaskStore;
use crate::application::undo_ledger::{Restored, UndoLedger};
use crate::application::Settlement;
use crate::domain::drag::{
    interpret_drop, resolve_linked_task, DragAction, DragSource, DraggedEntity, APPEND_INDEX,
};
use crate::domain::models::{
    format_instant, is_allowed_duration, is_temporary_id, CalendarEvent, DeletedEntity,
    EventPatch, Section, Task,
};
use crate::infrastructure::config::PlannerConfig;
use crate::infrastructure::data_service::{HttpPlannerDataService, PlannerDataService};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const API_TOKEN_ENV: &str = "DAYPLANNER_API_TOKEN";
const DATA_SERVICE_URL_ENV: &str = "DAYPLANNER_DATA_SERVICE_URL";

/// Composition root: owns every store for one planner session.
pub struct AppState {
    config_dir: PathBuf,
    logs_dir: PathBuf,
    config: PlannerConfig,
    time_zone: Tz,
    tasks: TaskStore,
    calendar: CalendarStore,
    undo: UndoLedger,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let (base_url, access_token) =
            data_service_settings_from_lookup(&bootstrap.config, |key| std::env::var(key).ok());
        let data_service = HttpPlannerDataService::new(&base_url, access_token)?;
        Self::from_bootstrap(bootstrap, Arc::new(data_service))
    }

    pub fn with_data_service(
        workspace_root: PathBuf,
        data_service: Arc<dyn PlannerDataService>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Self::from_bootstrap(bootstrap, data_service)
    }

    fn from_bootstrap(
        bootstrap: BootstrapResult,
        data_service: Arc<dyn PlannerDataService>,
    ) -> Result<Self, InfraError> {
        let time_zone = bootstrap.config.time_zone()?;
        let undo_window = std::time::Duration::from_secs(bootstrap.config.undo_window_seconds);
        Ok(Self {
            config_dir: bootstrap.config_dir,
            logs_dir: bootstrap.logs_dir,
            config: bootstrap.config,
            time_zone,
            tasks: TaskStore::new(Arc::clone(&data_service)),
            calendar: CalendarStore::new(data_service),
            undo: UndoLedger::new(undo_window),
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn calendar(&self) -> &CalendarStore {
        &self.calendar
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

/// Background network leg of an optimistic command. Dropping it lets the leg
/// finish unobserved.
#[derive(Debug, Default)]
#[must_use = "dropping detaches the background sync"]
pub struct BackgroundSync {
    handle: Option<JoinHandle<Settlement>>,
}

impl BackgroundSync {
    fn spawned(handle: JoinHandle<Settlement>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Waits for the network leg. `None` when nothing was sent in the
    /// background.
    pub async fn settled(self) -> Result<Option<Settlement>, InfraError> {
        let Some(handle) = self.handle else {
            return Ok(None);
        };
        handle
            .await
            .map(Some)
            .map_err(|error| InfraError::State(format!("background sync task failed: {error}")))
    }
}

#[derive(Debug)]
pub struct DropOutcome {
    pub action: DragAction,
    pub created_task: Option<Task>,
    pub sync: BackgroundSync,
}

impl DropOutcome {
    fn local(action: DragAction) -> Self {
        Self {
            action,
            created_task: None,
            sync: BackgroundSync::default(),
        }
    }

    pub async fn settled(self) -> Result<Option<Settlement>, InfraError> {
        self.sync.settled().await
    }
}

pub async fn load_tasks_impl(state: &AppState) -> Result<Vec<Task>, InfraError> {
    let tasks = state.tasks.load().await?;
    state.log_info("load_tasks", &format!("loaded count={}", tasks.len()));
    Ok(tasks)
}

pub async fn load_calendar_impl(
    state: &AppState,
    start: Option<String>,
    end: Option<String>,
) -> Result<Vec<CalendarEvent>, InfraError> {
    let (window_start, window_end) =
        resolve_calendar_window(start, end, state.config.calendar_window_days, Utc::now())?;
    let events = state.calendar.load(window_start, window_end).await?;
    state.log_info(
        "load_calendar",
        &format!(
            "loaded count={} time_min={} time_max={}",
            events.len(),
            format_instant(window_start),
            format_instant(window_end)
        ),
    );
    Ok(events)
}

pub fn list_tasks_impl(state: &AppState, section: Option<String>) -> Result<Vec<Task>, InfraError> {
    match section {
        Some(raw) => state.tasks.tasks_in_section(parse_section(&raw)?),
        None => state.tasks.snapshot(),
    }
}

pub fn list_events_impl(state: &AppState) -> Result<Vec<CalendarEvent>, InfraError> {
    state.calendar.snapshot()
}

pub async fn add_task_impl(
    state: &AppState,
    title: String,
    duration_minutes: Option<u32>,
    section: Option<String>,
) -> Result<Task, InfraError> {
    let duration_minutes = duration_minutes.unwrap_or(state.config.default_duration_minutes);
    ensure_allowed_duration(duration_minutes)?;
    let section = match section {
        Some(raw) => parse_section(&raw)?,
        None => state.config.default_section,
    };

    let task = state.tasks.add(&title, duration_minutes, section).await?;
    state.log_info(
        "add_task",
        &format!("created task_id={} section={section} position={}", task.id, task.position),
    );
    Ok(task)
}

pub async fn update_task_duration_impl(
    state: &AppState,
    task_id: String,
    duration_minutes: u32,
) -> Result<Task, InfraError> {
    ensure_allowed_duration(duration_minutes)?;
    let task_id = required_id(&task_id, "task_id")?;
    let task = state.tasks.update_duration(task_id, duration_minutes).await?;
    state.log_info(
        "update_task_duration",
        &format!("updated task_id={task_id} duration={duration_minutes}"),
    );
    Ok(task)
}

pub async fn update_task_title_impl(
    state: &AppState,
    task_id: String,
    title: String,
) -> Result<Task, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;
    let task = state.tasks.update_title(task_id, &title).await?;
    state.log_info("update_task_title", &format!("updated task_id={task_id}"));
    Ok(task)
}

/// Classifies a finished drag and runs the matching store operation.
pub async fn apply_drop_impl(
    state: &AppState,
    source_id: String,
    target_id: String,
) -> Result<DropOutcome, InfraError> {
    let tasks = state.tasks.snapshot()?;
    let action = match DragSource::parse(&source_id) {
        DragSource::Event(event_id) => match state.calendar.get(&event_id)? {
            Some(event) => interpret_drop(
                &source_id,
                &target_id,
                DraggedEntity::Event(&event),
                &tasks,
                state.time_zone,
            ),
            None => DragAction::NoOp,
        },
        DragSource::Task(task_id) => match tasks.iter().find(|task| task.id == task_id) {
            Some(task) => interpret_drop(
                &source_id,
                &target_id,
                DraggedEntity::Task(task),
                &tasks,
                state.time_zone,
            ),
            None => DragAction::NoOp,
        },
    };
    debug!(source_id = %source_id, target_id = %target_id, ?action, "interpreted drop");

    let outcome = match &action {
        DragAction::NoOp => DropOutcome::local(action.clone()),
        DragAction::ScheduleTask { task_id, start } => {
            let sync = schedule_task(state, task_id, *start)?;
            DropOutcome {
                action: action.clone(),
                created_task: None,
                sync,
            }
        }
        DragAction::UnscheduleAndMove {
            task_id,
            event_id,
            section,
            index,
        } => {
            let sync = unschedule_task(state, task_id, event_id, *section, *index)?;
            DropOutcome {
                action: action.clone(),
                created_task: None,
                sync,
            }
        }
        DragAction::RescheduleEvent {
            event_id,
            start,
            duration_minutes,
        } => {
            let sync = reschedule_event(state, event_id, *start, *duration_minutes)?;
            DropOutcome {
                action: action.clone(),
                created_task: None,
                sync,
            }
        }
        DragAction::MoveTask {
            task_id,
            section,
            index,
        } => {
            state.tasks.reorder(task_id, *section, *index).await?;
            DropOutcome::local(action.clone())
        }
        DragAction::AdoptExternalEvent {
            title,
            duration_minutes,
            section,
            ..
        } => {
            let created = state.tasks.add(title, *duration_minutes, *section).await?;
            DropOutcome {
                action: action.clone(),
                created_task: Some(created),
                sync: BackgroundSync::default(),
            }
        }
    };

    state.log_info(
        "apply_drop",
        &format!("source={source_id} target={target_id} action={}", describe_action(&action)),
    );
    Ok(outcome)
}

/// Deletes a task after recording it for undo. A scheduled task's event is
/// deleted first; the task stays untouched if that fails. Returns `false` for
/// unknown ids.
pub async fn delete_task_impl(state: &AppState, task_id: String) -> Result<bool, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;
    let Some(task) = state.tasks.get(task_id)? else {
        return Ok(false);
    };
    if let Some(event_id) = task.linked_event_id.as_deref().filter(|id| is_temporary_id(id)) {
        return Err(InfraError::PendingConfirmation(format!(
            "task {task_id} is still being scheduled as {event_id}"
        )));
    }

    if let Some(event_id) = task.linked_event_id.as_deref() {
        state.calendar.remove(event_id).await?;
    }

    let entry = DeletedEntity::Task(task.clone());
    state.undo.record_deletion(entry.clone())?;
    if let Err(error) = state.tasks.remove(task_id).await {
        state.undo.retract(&entry)?;
        if task.is_scheduled() {
            release_to_section(state, &task);
        }
        return Err(error);
    }

    state.log_info("delete_task", &format!("deleted task_id={task_id}"));
    Ok(true)
}

/// The task's event is gone but the task is not, so it goes back to the end
/// of its section.
fn release_to_section(state: &AppState, task: &Task) {
    match state
        .tasks
        .unschedule_and_move(&task.id, task.section, APPEND_INDEX, |_| {})
    {
        Ok(handle) => drop(handle),
        Err(error) => {
            warn!(task_id = %task.id, %error, "task still points at a deleted event");
        }
    }
}

/// Deletes a calendar event. An event that represents a task unschedules that
/// task back to the end of its section instead, and is not recorded for undo.
pub fn delete_event_impl(state: &AppState, event_id: String) -> Result<BackgroundSync, InfraError> {
    let event_id = required_id(&event_id, "event_id")?;
    let event = state
        .calendar
        .get(event_id)?
        .ok_or_else(|| InfraError::NotFound(format!("event {event_id}")))?;

    let tasks = state.tasks.snapshot()?;
    if let Some(task) = resolve_linked_task(&event, &tasks) {
        let sync = unschedule_task(state, &task.id, &event.id, task.section, APPEND_INDEX)?;
        state.log_info(
            "delete_event",
            &format!("unscheduled task_id={} event_id={event_id}", task.id),
        );
        return Ok(sync);
    }
    if event.is_temporary() {
        return Err(InfraError::PendingConfirmation(format!(
            "event {event_id} has not been confirmed by the provider"
        )));
    }

    let entry = DeletedEntity::Event(event);
    state.undo.record_deletion(entry.clone())?;
    match state.calendar.remove_optimistic(event_id) {
        Ok(handle) => {
            state.log_info("delete_event", &format!("deleted event_id={event_id}"));
            Ok(BackgroundSync::spawned(handle))
        }
        Err(error) => {
            state.undo.retract(&entry)?;
            Err(error)
        }
    }
}

/// Deletes every unscheduled task of `section`, or of all sections. Each task
/// gets its own undo entry before any delete is sent.
pub async fn clear_unscheduled_impl(
    state: &AppState,
    section: Option<String>,
) -> Result<usize, InfraError> {
    let sections = match section {
        Some(raw) => vec![parse_section(&raw)?],
        None => Section::ALL.to_vec(),
    };
    let mut doomed = Vec::new();
    for section in sections {
        doomed.extend(state.tasks.tasks_in_section(section)?);
    }

    let entries = doomed
        .into_iter()
        .map(DeletedEntity::Task)
        .collect::<Vec<_>>();
    for entry in &entries {
        state.undo.record_deletion(entry.clone())?;
    }

    let mut deleted = 0;
    let mut first_error = None;
    for entry in &entries {
        let DeletedEntity::Task(task) = entry else {
            continue;
        };
        match state.tasks.remove(&task.id).await {
            Ok(_) => deleted += 1,
            Err(error) => {
                warn!(task_id = %task.id, %error, "bulk delete skipped task");
                state.undo.retract(entry)?;
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
    }

    state.log_info("clear_unscheduled", &format!("deleted count={deleted}"));
    match first_error {
        Some(error) => Err(error),
        None => Ok(deleted),
    }
}

pub async fn undo_delete_impl(state: &AppState) -> Result<Option<Restored>, InfraError> {
    let restored = state.undo.undo_last(&state.tasks, &state.calendar).await?;
    match &restored {
        Some(Restored::Task(task)) => {
            state.log_info("undo_delete", &format!("restored task_id={}", task.id));
        }
        Some(Restored::Event(event)) => {
            state.log_info("undo_delete", &format!("restored event_id={}", event.id));
        }
        None => {}
    }
    Ok(restored)
}

pub fn dismiss_undo_impl(state: &AppState) -> Result<usize, InfraError> {
    let dropped = state.undo.dismiss()?;
    state.log_info("dismiss_undo", &format!("dropped count={dropped}"));
    Ok(dropped)
}

pub fn pending_undo_count(state: &AppState) -> Result<usize, InfraError> {
    state.undo.len()
}

/// Menu edit of an event: rename, recolor, or explicit times. An empty color
/// clears the tag.
pub async fn update_event_impl(
    state: &AppState,
    event_id: String,
    title: Option<String>,
    color_tag: Option<String>,
    start: Option<String>,
    end: Option<String>,
) -> Result<CalendarEvent, InfraError> {
    let event_id = required_id(&event_id, "event_id")?;
    let title = match title {
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(InfraError::InvalidInput("title must not be empty".to_string()));
            }
            Some(trimmed.to_string())
        }
        None => None,
    };
    let patch = EventPatch {
        title,
        start: start
            .map(|raw| parse_rfc3339_input(&raw, "start"))
            .transpose()?,
        end: end.map(|raw| parse_rfc3339_input(&raw, "end")).transpose()?,
        color_tag: color_tag.map(|raw| {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }),
    };

    let updated = state.calendar.update(event_id, &patch).await?;
    state.log_info("update_event", &format!("updated event_id={event_id}"));
    Ok(updated)
}

/// Moves an event to a new start, keeping its duration.
pub fn move_event_impl(
    state: &AppState,
    event_id: String,
    start: String,
) -> Result<BackgroundSync, InfraError> {
    let event_id = required_id(&event_id, "event_id")?;
    let start = parse_rfc3339_input(&start, "start")?;
    let event = state
        .calendar
        .get(event_id)?
        .ok_or_else(|| InfraError::NotFound(format!("event {event_id}")))?;
    let duration_minutes = positive_minutes(event.duration_minutes())?;

    let sync = reschedule_event(state, event_id, start, duration_minutes)?;
    state.log_info(
        "move_event",
        &format!("moved event_id={event_id} start={}", format_instant(start)),
    );
    Ok(sync)
}

/// Changes an event's length, keeping its start.
pub fn resize_event_impl(
    state: &AppState,
    event_id: String,
    duration_minutes: i64,
) -> Result<BackgroundSync, InfraError> {
    let event_id = required_id(&event_id, "event_id")?;
    let duration_minutes = positive_minutes(duration_minutes)?;
    let event = state
        .calendar
        .get(event_id)?
        .ok_or_else(|| InfraError::NotFound(format!("event {event_id}")))?;

    let handle = state
        .calendar
        .update_optimistic(event_id, event.start, duration_minutes)?;
    state.log_info(
        "resize_event",
        &format!("resized event_id={event_id} duration={duration_minutes}"),
    );
    Ok(BackgroundSync::spawned(handle))
}

/// Moves an event. The task an event represents gets the new start too, and
/// follows the event back if the move is rolled back.
fn reschedule_event(
    state: &AppState,
    event_id: &str,
    start: DateTime<Utc>,
    duration_minutes: u32,
) -> Result<BackgroundSync, InfraError> {
    let tasks = state.tasks.snapshot()?;
    let linked_task_id = state
        .calendar
        .get(event_id)?
        .and_then(|event| resolve_linked_task(&event, &tasks).map(|task| task.id.clone()));

    let handle = state
        .calendar
        .update_optimistic(event_id, start, duration_minutes)?;
    let Some(task_id) = linked_task_id else {
        return Ok(BackgroundSync::spawned(handle));
    };
    match state.tasks.reschedule_optimistic(&task_id, start) {
        Ok(pending) => Ok(BackgroundSync::spawned(pending.follow(handle))),
        Err(error) => {
            warn!(task_id = %task_id, event_id, %error, "linked task start left as is");
            Ok(BackgroundSync::spawned(handle))
        }
    }
}

fn schedule_task(
    state: &AppState,
    task_id: &str,
    start: DateTime<Utc>,
) -> Result<BackgroundSync, InfraError> {
    let pending = state.tasks.schedule_optimistic(task_id, start)?;
    state.calendar.add(pending.temp_event().clone())?;

    let confirmed_calendar = state.calendar.clone();
    let rollback_calendar = state.calendar.clone();
    let handle = pending.dispatch(
        move |temp_id, real_event| {
            if let Err(error) = confirmed_calendar.replace(&temp_id, real_event) {
                warn!(temp_id = %temp_id, %error, "could not swap confirmed event into calendar");
            }
        },
        move |temp_id| {
            if let Err(error) = rollback_calendar.remove_local(&temp_id) {
                warn!(temp_id = %temp_id, %error, "could not drop temporary event");
            }
        },
    );
    Ok(BackgroundSync::spawned(handle))
}

fn unschedule_task(
    state: &AppState,
    task_id: &str,
    event_id: &str,
    section: Section,
    index: usize,
) -> Result<BackgroundSync, InfraError> {
    if is_temporary_id(event_id) {
        return Err(InfraError::PendingConfirmation(format!(
            "event {event_id} has not been confirmed by the provider"
        )));
    }

    let removed = state.calendar.remove_local(event_id)?;
    let calendar = state.calendar.clone();
    let rematerialize = removed.clone();
    let result = state
        .tasks
        .unschedule_and_move(task_id, section, index, move |original| {
            let Some(event) = rematerialize else {
                debug!(task_id = %original.id, "no calendar event to re-add");
                return;
            };
            if let Err(error) = calendar.add(event) {
                warn!(task_id = %original.id, %error, "could not re-add event after rollback");
            }
        });

    match result {
        Ok(handle) => Ok(BackgroundSync::spawned(handle)),
        Err(error) => {
            if let Some(event) = removed {
                state.calendar.add(event)?;
            }
            Err(error)
        }
    }
}

fn describe_action(action: &DragAction) -> String {
    match action {
        DragAction::RescheduleEvent {
            event_id,
            start,
            duration_minutes,
        } => format!(
            "reschedule event_id={event_id} start={} duration={duration_minutes}",
            format_instant(*start)
        ),
        DragAction::UnscheduleAndMove {
            task_id, section, ..
        } => format!("unschedule task_id={task_id} section={section}"),
        DragAction::AdoptExternalEvent {
            event_id,
            duration_minutes,
            section,
            ..
        } => format!("adopt event_id={event_id} section={section} duration={duration_minutes}"),
        DragAction::ScheduleTask { task_id, start } => {
            format!("schedule task_id={task_id} start={}", format_instant(*start))
        }
        DragAction::MoveTask {
            task_id,
            section,
            index,
        } => format!("move task_id={task_id} section={section} index={index}"),
        DragAction::NoOp => "none".to_string(),
    }
}

fn data_service_settings_from_lookup<F>(
    config: &PlannerConfig,
    lookup: F,
) -> (String, Option<String>)
where
    F: Fn(&str) -> Option<String>,
{
    let base_url = lookup(DATA_SERVICE_URL_ENV)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| config.data_service_url.clone());
    let access_token = lookup(API_TOKEN_ENV)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    (base_url, access_token)
}

fn required_id<'a>(value: &'a str, field_name: &str) -> Result<&'a str, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::InvalidInput(format!(
            "{field_name} must not be empty"
        )));
    }
    Ok(value)
}

fn parse_section(value: &str) -> Result<Section, InfraError> {
    Section::parse(value.trim())
        .ok_or_else(|| InfraError::InvalidInput(format!("unknown section: {value}")))
}

fn ensure_allowed_duration(duration_minutes: u32) -> Result<(), InfraError> {
    if !is_allowed_duration(duration_minutes) {
        return Err(InfraError::InvalidInput(format!(
            "duration {duration_minutes} is not one of the allowed durations"
        )));
    }
    Ok(())
}

fn positive_minutes(duration_minutes: i64) -> Result<u32, InfraError> {
    u32::try_from(duration_minutes)
        .ok()
        .filter(|minutes| *minutes > 0)
        .ok_or_else(|| {
            InfraError::InvalidInput(format!("duration must be > 0 minutes, got {duration_minutes}"))
        })
}

fn resolve_calendar_window(
    start: Option<String>,
    end: Option<String>,
    window_days: u32,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), InfraError> {
    let start = match start {
        Some(raw) => parse_datetime_input(&raw, "start")?,
        None => Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN)),
    };
    let end = match end {
        Some(raw) => parse_datetime_input(&raw, "end")?,
        None => start + Duration::days(i64::from(window_days.max(1))),
    };
    if end <= start {
        return Err(InfraError::InvalidInput(
            "end must be greater than start".to_string(),
        ));
    }
    Ok((start, end))
}

fn parse_datetime_input(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    Err(InfraError::InvalidInput(format!(
        "{field_name} must be RFC3339 or YYYY-MM-DD"
    )))
}

fn parse_rfc3339_input(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| InfraError::InvalidInput(format!("{field_name} must be RFC3339: {error}")))
}
