use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ALLOWED_DURATIONS: [u32; 7] = [5, 15, 30, 45, 60, 90, 120];
pub const TEMP_EVENT_PREFIX: &str = "temp-";

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum Section {
    #[default]
    #[serde(rename = "inbox")]
    Inbox,
    #[serde(rename = "2min")]
    TwoMinute,
    #[serde(rename = "mustdo")]
    MustDo,
    #[serde(rename = "iftime")]
    IfTime,
    #[serde(rename = "later")]
    Later,
    #[serde(rename = "someday")]
    Someday,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::Inbox,
        Section::TwoMinute,
        Section::MustDo,
        Section::IfTime,
        Section::Later,
        Section::Someday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::TwoMinute => "2min",
            Self::MustDo => "mustdo",
            Self::IfTime => "iftime",
            Self::Later => "later",
            Self::Someday => "someday",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|section| section.as_str() == value)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub duration_minutes: u32,
    pub section: Section,
    pub position: u32,
    #[serde(default)]
    pub scheduled: Option<DateTime<Utc>>,
    #[serde(default)]
    pub linked_event_id: Option<String>,
}

impl Task {
    /// A task is on the calendar only when both schedule fields are set.
    pub fn is_scheduled(&self) -> bool {
        self.scheduled.is_some() && self.linked_event_id.is_some()
    }

    pub fn clear_schedule(&mut self) {
        self.scheduled = None;
        self.linked_event_id = None;
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        if self.duration_minutes == 0 {
            return Err("task.duration_minutes must be > 0".to_string());
        }
        if self.scheduled.is_some() != self.linked_event_id.is_some() {
            return Err("task.scheduled and task.linked_event_id must be set together".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub is_external_origin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_task_id: Option<String>,
}

impl CalendarEvent {
    pub fn is_temporary(&self) -> bool {
        is_temporary_id(&self.id)
    }

    /// Span rounded to the nearest whole minute; negative for inverted events.
    pub fn duration_minutes(&self) -> i64 {
        let millis = (self.end - self.start).num_milliseconds();
        (millis as f64 / 60_000.0).round() as i64
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "event.id")?;
        if self.end <= self.start {
            return Err("event.end must be after event.start".to_string());
        }
        if self.is_external_origin && self.linked_task_id.is_some() {
            return Err("external events must not carry a linked task".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub duration_minutes: u32,
    pub section: Section,
    pub position: u32,
}

/// Partial task update. `Some(None)` on a nullable field clears it.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<Section>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_event_id: Option<Option<String>>,
}

impl TaskPatch {
    pub fn schedule(start: DateTime<Utc>, event_id: &str) -> Self {
        Self {
            scheduled: Some(Some(start)),
            linked_event_id: Some(Some(event_id.to_string())),
            ..Self::default()
        }
    }

    pub fn unschedule_into(section: Section, position: u32) -> Self {
        Self {
            section: Some(section),
            position: Some(position),
            scheduled: Some(None),
            linked_event_id: Some(None),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(duration) = self.duration_minutes {
            task.duration_minutes = duration;
        }
        if let Some(section) = self.section {
            task.section = section;
        }
        if let Some(position) = self.position {
            task.position = position;
        }
        if let Some(scheduled) = self.scheduled {
            task.scheduled = scheduled;
        }
        if let Some(linked) = &self.linked_event_id {
            task.linked_event_id = linked.clone();
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_tag: Option<Option<String>>,
}

impl EventPatch {
    pub fn timing(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, event: &mut CalendarEvent) {
        if let Some(title) = &self.title {
            event.title = title.clone();
        }
        if let Some(start) = self.start {
            event.start = start;
        }
        if let Some(end) = self.end {
            event.end = end;
        }
        if let Some(color_tag) = &self.color_tag {
            event.color_tag = color_tag.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPosition {
    pub id: String,
    pub section: Section,
    pub position: u32,
}

/// Immutable copy of an entity captured right before it was deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "snapshot", rename_all = "snake_case")]
pub enum DeletedEntity {
    Task(Task),
    Event(CalendarEvent),
}

pub fn temp_event_id(task_id: &str, now: DateTime<Utc>) -> String {
    format!("{TEMP_EVENT_PREFIX}{task_id}-{}", now.timestamp_millis())
}

pub fn is_temporary_id(id: &str) -> bool {
    id.starts_with(TEMP_EVENT_PREFIX)
}

pub fn end_after(start: DateTime<Utc>, duration_minutes: u32) -> DateTime<Utc> {
    start + Duration::minutes(i64::from(duration_minutes))
}

pub fn format_instant(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn is_allowed_duration(duration_minutes: u32) -> bool {
    ALLOWED_DURATIONS.contains(&duration_minutes)
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_task() -> Task {
        Task {
            id: "task-1".to_string(),
            title: "Write tests".to_string(),
            duration_minutes: 30,
            section: Section::MustDo,
            position: 0,
            scheduled: None,
            linked_event_id: None,
        }
    }

    fn sample_event() -> CalendarEvent {
        CalendarEvent {
            id: "gcal-123".to_string(),
            title: "Standup".to_string(),
            start: fixed_time("2024-01-01T10:00:00Z"),
            end: fixed_time("2024-01-01T11:30:00Z"),
            is_external_origin: true,
            color_tag: None,
            linked_task_id: None,
        }
    }

    #[test]
    fn section_defaults_to_inbox() {
        assert_eq!(Section::default(), Section::Inbox);
    }

    #[test]
    fn task_validate_requires_schedule_fields_together() {
        let mut task = sample_task();
        assert!(task.validate().is_ok());

        task.scheduled = Some(fixed_time("2024-01-01T10:00:00Z"));
        assert!(task.validate().is_err());

        task.linked_event_id = Some("evt-1".to_string());
        assert!(task.validate().is_ok());
        assert!(task.is_scheduled());

        task.clear_schedule();
        assert!(!task.is_scheduled());
    }

    #[test]
    fn event_validate_rejects_zero_length() {
        let mut event = sample_event();
        assert!(event.validate().is_ok());
        event.end = event.start;
        assert!(event.validate().is_err());
    }

    #[test]
    fn event_duration_rounds_to_nearest_minute() {
        let mut event = sample_event();
        assert_eq!(event.duration_minutes(), 90);
        event.end = fixed_time("2024-01-01T10:44:31Z");
        assert_eq!(event.duration_minutes(), 45);
    }

    #[test]
    fn end_after_formats_with_millisecond_precision() {
        let end = end_after(fixed_time("2024-01-01T14:00:00Z"), 90);
        assert_eq!(format_instant(end), "2024-01-01T15:30:00.000Z");
    }

    #[test]
    fn temp_ids_carry_task_and_timestamp() {
        let id = temp_event_id("task-7", fixed_time("2024-01-01T00:00:00Z"));
        assert_eq!(id, "temp-task-7-1704067200000");
        assert!(is_temporary_id(&id));
        assert!(!is_temporary_id("gcal-123"));
    }

    #[test]
    fn section_names_match_wire_format() {
        for section in Section::ALL {
            let encoded = serde_json::to_string(&section).expect("serialize section");
            assert_eq!(encoded, format!("\"{}\"", section.as_str()));
            assert_eq!(Section::parse(section.as_str()), Some(section));
        }
        assert_eq!(Section::parse("2min"), Some(Section::TwoMinute));
        assert_eq!(Section::parse("tomorrow"), None);
    }

    #[test]
    fn task_patch_serializes_cleared_fields_as_null() {
        let patch = TaskPatch::unschedule_into(Section::Later, 3);
        let value = serde_json::to_value(&patch).expect("serialize patch");
        assert_eq!(
            value,
            serde_json::json!({
                "section": "later",
                "position": 3,
                "scheduled": null,
                "linkedEventId": null
            })
        );

        let mut task = sample_task();
        task.scheduled = Some(fixed_time("2024-01-01T10:00:00Z"));
        task.linked_event_id = Some("evt-1".to_string());
        patch.apply_to(&mut task);
        assert_eq!(task.section, Section::Later);
        assert_eq!(task.position, 3);
        assert!(!task.is_scheduled());
    }

    #[test]
    fn deleted_entity_uses_kind_and_snapshot_tags() {
        let entry = DeletedEntity::Task(sample_task());
        let value = serde_json::to_value(&entry).expect("serialize entry");
        assert_eq!(value["kind"], "task");
        assert_eq!(value["snapshot"]["id"], "task-1");

        let roundtrip: DeletedEntity = serde_json::from_value(value).expect("deserialize entry");
        assert_eq!(roundtrip, entry);
    }

    #[test]
    fn allowed_durations_are_fixed() {
        assert!(is_allowed_duration(90));
        assert!(!is_allowed_duration(20));
    }
}
