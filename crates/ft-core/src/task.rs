//! Task records and their closed project/kind vocabularies.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{TaskId, UserId, ValidationError};

/// The closed set of projects a task or session can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Project {
    Ga,
    Poly,
    Oureon,
    Personal,
}

impl Project {
    /// String representation for storage and display.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ga => "GA",
            Self::Poly => "Poly",
            Self::Oureon => "Oureon",
            Self::Personal => "Personal",
        }
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Project {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GA" => Ok(Self::Ga),
            "Poly" => Ok(Self::Poly),
            "Oureon" => Ok(Self::Oureon),
            "Personal" => Ok(Self::Personal),
            _ => Err(ValidationError::UnknownVariant {
                field: "project",
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for Project {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Project {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The closed set of task kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Study,
    Code,
    Admin,
    Life,
}

impl TaskKind {
    /// String representation for storage and display.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Study => "study",
            Self::Code => "code",
            Self::Admin => "admin",
            Self::Life => "life",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "study" => Ok(Self::Study),
            "code" => Ok(Self::Code),
            "admin" => Ok(Self::Admin),
            "life" => Ok(Self::Life),
            _ => Err(ValidationError::UnknownVariant {
                field: "task kind",
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for TaskKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A tracked task owned by one user.
///
/// `completed_at` is set iff `completed` is true; the store maintains that
/// invariant on every toggle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub project: Project,
    pub kind: TaskKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a task. Title is validated by the store before insert.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub project: Project,
    pub kind: TaskKind,
    pub deadline: Option<DateTime<Utc>>,
}

/// A partial update to a task. `None` fields are left untouched;
/// `deadline` uses a double option so "clear the deadline" is expressible.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub project: Option<Project>,
    pub kind: Option<TaskKind>,
    pub deadline: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    /// True when the patch would change nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.project.is_none()
            && self.kind.is_none()
            && self.deadline.is_none()
    }
}
