//! Timeline events: an append-only audit log of task and session mutations.
//!
//! Events are written by the mutating operations themselves, never derived
//! after the fact. Deleting a task does not remove its earlier events — the
//! log records what happened, independent of what still exists.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::session::FocusSession;
use crate::task::Task;
use crate::types::{EventId, UserId, ValidationError};
use crate::window;

/// The closed set of timeline event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimelineEventKind {
    TaskCreated,
    TaskCompleted,
    TaskDeleted,
    FocusStarted,
    FocusEnded,
}

impl TimelineEventKind {
    /// Wire/storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskCreated => "TASK_CREATED",
            Self::TaskCompleted => "TASK_COMPLETED",
            Self::TaskDeleted => "TASK_DELETED",
            Self::FocusStarted => "FOCUS_STARTED",
            Self::FocusEnded => "FOCUS_ENDED",
        }
    }
}

impl fmt::Display for TimelineEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TimelineEventKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TASK_CREATED" => Ok(Self::TaskCreated),
            "TASK_COMPLETED" => Ok(Self::TaskCompleted),
            "TASK_DELETED" => Ok(Self::TaskDeleted),
            "FOCUS_STARTED" => Ok(Self::FocusStarted),
            "FOCUS_ENDED" => Ok(Self::FocusEnded),
            _ => Err(ValidationError::UnknownVariant {
                field: "timeline event kind",
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for TimelineEventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TimelineEventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An immutable audit-log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimelineEvent {
    pub id: EventId,
    pub user_id: UserId,
    pub kind: TimelineEventKind,
    pub created_at: DateTime<Utc>,
    /// Kind-specific display context (see the `metadata` constructors).
    pub metadata: Value,
}

/// Metadata payload builders, one per event kind.
///
/// These freeze what each mutation records about the entity at the time it
/// happened, so the timeline stays renderable after the entity changes or
/// is deleted.
pub mod metadata {
    use super::{FocusSession, Task, Value, json};

    #[must_use]
    pub fn task_created(task: &Task) -> Value {
        json!({
            "title": task.title,
            "project": task.project,
            "type": task.kind,
        })
    }

    #[must_use]
    pub fn task_completed(task: &Task) -> Value {
        json!({
            "title": task.title,
            "project": task.project,
        })
    }

    #[must_use]
    pub fn task_deleted(task: &Task) -> Value {
        json!({
            "title": task.title,
            "project": task.project,
        })
    }

    #[must_use]
    pub fn focus_started(session: &FocusSession) -> Value {
        json!({
            "mode": session.mode,
            "project": session.project,
            "planned_minutes": session.planned_minutes,
        })
    }

    #[must_use]
    pub fn focus_ended(session: &FocusSession) -> Value {
        json!({
            "mode": session.mode,
            "project": session.project,
            "actual_minutes": session.duration_minutes(),
            "rating": session.rating,
        })
    }
}

/// Events of one calendar day, oldest first.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DayGroup {
    pub day: NaiveDate,
    pub events: Vec<TimelineEvent>,
}

/// Groups events by reference-timezone day: days newest first, events within
/// a day oldest first. Input order does not matter; the same window and
/// records always produce the same grouping.
#[must_use]
pub fn group_by_day(mut events: Vec<TimelineEvent>, offset: FixedOffset) -> Vec<DayGroup> {
    events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.as_str().cmp(b.id.as_str())));

    let mut groups: Vec<DayGroup> = Vec::new();
    for event in events {
        let day = window::local_day(event.created_at, offset);
        match groups.iter_mut().find(|group| group.day == day) {
            Some(group) => group.events.push(event),
            None => groups.push(DayGroup {
                day,
                events: vec![event],
            }),
        }
    }
    groups.sort_by(|a, b| b.day.cmp(&a.day));
    groups
}
