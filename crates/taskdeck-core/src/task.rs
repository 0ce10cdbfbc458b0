use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Days between "today" and the due date the creation form pre-fills.
pub const DEFAULT_DUE_OFFSET_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Todo,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: Priority,
    pub due_date: NaiveDate,
}

/// A validated task payload that has not been assigned an id yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: Priority,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("Task title is required")]
    MissingTitle,
    #[error("Task description is required")]
    MissingDescription,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Todo, Status::InProgress, Status::Done];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in-progress",
            Status::Done => "done",
        }
    }
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "todo" => Ok(Status::Todo),
            "in-progress" | "inprogress" | "in_progress" => Ok(Status::InProgress),
            "done" => Ok(Status::Done),
            other => Err(ParseEnumError::new("status", other)),
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseEnumError::new("priority", s))
    }
}

impl Task {
    /// Accepts a draft under a fresh UUID v4 id.
    pub fn from_draft(draft: TaskDraft) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), draft)
    }

    pub fn with_id(id: String, draft: TaskDraft) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            status: draft.status,
            priority: draft.priority,
            due_date: draft.due_date,
        }
    }

    pub fn matches_text(&self, needle_lower: &str) -> bool {
        needle_lower.is_empty()
            || self.title.to_lowercase().contains(needle_lower)
            || self.description.to_lowercase().contains(needle_lower)
    }
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, description: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            status: Status::default(),
            priority: Priority::default(),
            due_date: Self::default_due_date(today),
        }
    }

    pub fn default_due_date(today: NaiveDate) -> NaiveDate {
        today
            .checked_add_days(Days::new(DEFAULT_DUE_OFFSET_DAYS))
            .unwrap_or(today)
    }

    pub fn validate(&self) -> Result<(), DraftError> {
        if self.title.trim().is_empty() {
            return Err(DraftError::MissingTitle);
        }
        if self.description.trim().is_empty() {
            return Err(DraftError::MissingDescription);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{DraftError, Priority, Status, Task, TaskDraft};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn wire_format_matches_web_client() {
        let task = Task {
            id: "1".to_string(),
            title: "Buy milk".to_string(),
            description: "2 litres".to_string(),
            status: Status::InProgress,
            priority: Priority::High,
            due_date: day(2025, 1, 1),
        };

        let json = serde_json::to_value(&task).expect("serialize");
        assert_eq!(json["status"], "in-progress");
        assert_eq!(json["priority"], "high");
        assert_eq!(json["dueDate"], "2025-01-01");

        let back: Task = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, task);
    }

    #[test]
    fn draft_defaults_follow_creation_form() {
        let draft = TaskDraft::new("Walk dog", "around the block", day(2025, 12, 28));
        assert_eq!(draft.status, Status::Todo);
        assert_eq!(draft.priority, Priority::Low);
        assert_eq!(draft.due_date, day(2026, 1, 4));
    }

    #[test]
    fn draft_validation_rejects_blank_fields() {
        let today = day(2025, 1, 1);
        assert_eq!(
            TaskDraft::new("  ", "desc", today).validate(),
            Err(DraftError::MissingTitle)
        );
        assert_eq!(
            TaskDraft::new("title", "", today).validate(),
            Err(DraftError::MissingDescription)
        );
        assert!(TaskDraft::new("title", "desc", today).validate().is_ok());
    }

    #[test]
    fn from_draft_assigns_distinct_ids() {
        let draft = TaskDraft::new("a", "b", day(2025, 1, 1));
        let first = Task::from_draft(draft.clone());
        let second = Task::from_draft(draft);
        assert_ne!(first.id, second.id);
        assert!(uuid::Uuid::parse_str(&first.id).is_ok());
    }

    #[test]
    fn parses_enum_wire_strings() {
        assert_eq!("in-progress".parse::<Status>(), Ok(Status::InProgress));
        assert_eq!("MEDIUM".parse::<Priority>(), Ok(Priority::Medium));
        assert!("urgent".parse::<Priority>().is_err());
    }
}
