//! Classifies a finished drag gesture into the store operation it stands for.
//!
//! Everything here is pure: the caller passes the current collections and gets
//! back a [`DragAction`] to dispatch.

use crate::domain::models::{CalendarEvent, Section, Task};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

const EVENT_SOURCE_PREFIX: &str = "event-";
const TASK_DROP_PREFIX: &str = "task-drop-";
const TIMESLOT_PREFIX: &str = "timeslot";

/// Index meaning "after the last task of the section".
pub const APPEND_INDEX: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
pub enum DraggedEntity<'a> {
    Task(&'a Task),
    Event(&'a CalendarEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragSource {
    Event(String),
    Task(String),
}

impl DragSource {
    pub fn parse(source_id: &str) -> Self {
        match source_id.strip_prefix(EVENT_SOURCE_PREFIX) {
            Some(event_id) => Self::Event(event_id.to_string()),
            None => Self::Task(source_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    Timeslot(NaiveDateTime),
    Section(Section),
    Task(String),
    Unrecognized,
}

impl DropTarget {
    pub fn parse(target_id: &str) -> Self {
        let target_id = target_id.trim();
        if target_id.is_empty() {
            return Self::Unrecognized;
        }
        if target_id.starts_with(TIMESLOT_PREFIX) {
            return parse_timeslot(target_id)
                .map(Self::Timeslot)
                .unwrap_or(Self::Unrecognized);
        }
        if let Some(section) = Section::parse(target_id) {
            return Self::Section(section);
        }
        let task_id = target_id.strip_prefix(TASK_DROP_PREFIX).unwrap_or(target_id);
        if task_id.is_empty() {
            return Self::Unrecognized;
        }
        Self::Task(task_id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragAction {
    RescheduleEvent {
        event_id: String,
        start: DateTime<Utc>,
        duration_minutes: u32,
    },
    UnscheduleAndMove {
        task_id: String,
        event_id: String,
        section: Section,
        index: usize,
    },
    AdoptExternalEvent {
        event_id: String,
        title: String,
        duration_minutes: u32,
        section: Section,
    },
    ScheduleTask {
        task_id: String,
        start: DateTime<Utc>,
    },
    MoveTask {
        task_id: String,
        section: Section,
        index: usize,
    },
    NoOp,
}

/// Parses `timeslot-YYYY-MM-DD-HH-MM` into a wall-clock time. Minutes past the
/// hour are not restricted to the grid step, but must stay within the hour.
pub fn parse_timeslot(target_id: &str) -> Option<NaiveDateTime> {
    let fields = target_id.split('-').collect::<Vec<_>>();
    let [prefix, year, month, day, hour, minute] = fields.as_slice() else {
        return None;
    };
    if *prefix != TIMESLOT_PREFIX {
        return None;
    }

    let date = NaiveDate::from_ymd_opt(
        year.parse::<i32>().ok()?,
        month.parse::<u32>().ok()?,
        day.parse::<u32>().ok()?,
    )?;
    date.and_hms_opt(hour.parse::<u32>().ok()?, minute.parse::<u32>().ok()?, 0)
}

pub fn interpret_drop(
    source_id: &str,
    target_id: &str,
    dragged: DraggedEntity<'_>,
    tasks: &[Task],
    time_zone: Tz,
) -> DragAction {
    let target = DropTarget::parse(target_id);
    match (DragSource::parse(source_id), dragged) {
        (DragSource::Event(_), DraggedEntity::Event(event)) => {
            interpret_event_drop(event, target, tasks, time_zone)
        }
        (DragSource::Task(_), DraggedEntity::Task(task)) => {
            interpret_task_drop(task, target, tasks, time_zone)
        }
        _ => DragAction::NoOp,
    }
}

/// Finds the task an event represents. The event's own back-reference wins;
/// otherwise any task pointing at the event id is used.
pub fn resolve_linked_task<'a>(event: &CalendarEvent, tasks: &'a [Task]) -> Option<&'a Task> {
    event
        .linked_task_id
        .as_deref()
        .and_then(|task_id| tasks.iter().find(|task| task.id == task_id))
        .or_else(|| {
            tasks
                .iter()
                .find(|task| task.linked_event_id.as_deref() == Some(event.id.as_str()))
        })
}

fn interpret_event_drop(
    event: &CalendarEvent,
    target: DropTarget,
    tasks: &[Task],
    time_zone: Tz,
) -> DragAction {
    let section = match target {
        DropTarget::Timeslot(local) => {
            let Some(start) = to_utc(local, time_zone) else {
                return DragAction::NoOp;
            };
            let Ok(duration_minutes) = u32::try_from(event.duration_minutes()) else {
                return DragAction::NoOp;
            };
            if duration_minutes == 0 {
                return DragAction::NoOp;
            }
            return DragAction::RescheduleEvent {
                event_id: event.id.clone(),
                start,
                duration_minutes,
            };
        }
        DropTarget::Section(section) => section,
        DropTarget::Task(target_id) => match find_card(tasks, &target_id) {
            Some(target) => target.section,
            None => return DragAction::NoOp,
        },
        DropTarget::Unrecognized => return DragAction::NoOp,
    };

    if let Some(task) = resolve_linked_task(event, tasks) {
        return DragAction::UnscheduleAndMove {
            task_id: task.id.clone(),
            event_id: event.id.clone(),
            section,
            index: APPEND_INDEX,
        };
    }

    match u32::try_from(event.duration_minutes()) {
        Ok(duration_minutes) if duration_minutes > 0 => DragAction::AdoptExternalEvent {
            event_id: event.id.clone(),
            title: event.title.clone(),
            duration_minutes,
            section,
        },
        _ => DragAction::NoOp,
    }
}

fn interpret_task_drop(
    task: &Task,
    target: DropTarget,
    tasks: &[Task],
    time_zone: Tz,
) -> DragAction {
    // A scheduled task is only draggable through its calendar event.
    if task.is_scheduled() {
        return DragAction::NoOp;
    }
    match target {
        DropTarget::Timeslot(local) => match to_utc(local, time_zone) {
            Some(start) => DragAction::ScheduleTask {
                task_id: task.id.clone(),
                start,
            },
            None => DragAction::NoOp,
        },
        DropTarget::Section(section) => DragAction::MoveTask {
            task_id: task.id.clone(),
            section,
            index: APPEND_INDEX,
        },
        DropTarget::Task(target_id) => {
            if target_id == task.id {
                return DragAction::NoOp;
            }
            let Some(target) = find_card(tasks, &target_id) else {
                return DragAction::NoOp;
            };
            let position = target.position as usize;
            let index = if target.section == task.section && task.position < target.position {
                position + 1
            } else {
                position
            };
            DragAction::MoveTask {
                task_id: task.id.clone(),
                section: target.section,
                index,
            }
        }
        DropTarget::Unrecognized => DragAction::NoOp,
    }
}

/// A task card that can take a drop. Scheduled tasks have no card in their
/// section, so their stale position is never used as a target.
fn find_card<'a>(tasks: &'a [Task], task_id: &str) -> Option<&'a Task> {
    tasks
        .iter()
        .find(|task| task.id == task_id && !task.is_scheduled())
}

fn to_utc(local: NaiveDateTime, time_zone: Tz) -> Option<DateTime<Utc>> {
    time_zone
        .from_local_datetime(&local)
        .earliest()
        .map(|value| value.with_timezone(&Utc))
}
