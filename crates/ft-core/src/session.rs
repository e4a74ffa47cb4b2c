//! Focus session records and the duration/active derivations.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::Project;
use crate::types::{Rating, SessionId, UserId, ValidationError};

/// The closed set of focus modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusMode {
    Study,
    Coding,
    Review,
    Exam,
}

impl FocusMode {
    /// String representation for storage and display.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Study => "study",
            Self::Coding => "coding",
            Self::Review => "review",
            Self::Exam => "exam",
        }
    }
}

impl fmt::Display for FocusMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FocusMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "study" => Ok(Self::Study),
            "coding" => Ok(Self::Coding),
            "review" => Ok(Self::Review),
            "exam" => Ok(Self::Exam),
            _ => Err(ValidationError::UnknownVariant {
                field: "focus mode",
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for FocusMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FocusMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One continuous block of tracked work.
///
/// A session is active while `ended_at` is `None`; at most one session per
/// user may be active at a time (enforced by the store). Rating and note are
/// only ever set by the end transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FocusSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub mode: FocusMode,
    pub project: Project,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl FocusSession {
    /// Whether the session is still running.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Duration in whole minutes, rounded to nearest; `None` while active.
    ///
    /// Computed from the stored instants rather than persisted, so it can
    /// never drift from `started_at`/`ended_at`.
    #[must_use]
    pub fn duration_minutes(&self) -> Option<i64> {
        let ended_at = self.ended_at?;
        let seconds = ended_at.signed_duration_since(self.started_at).num_seconds();
        // Round half-up to the nearest minute, matching round((end - start) / 60s)
        Some((seconds + 30).div_euclid(60))
    }
}
