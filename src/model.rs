use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum GoalStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(AppError::Validation(format!(
                "unknown goal status {other:?} (expected not_started, in_progress or completed)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(AppError::Validation(format!(
                "unknown priority {other:?} (expected low, medium or high)"
            ))),
        }
    }
}

/// Fields for a new goal. `status` and `priority` carry their defaults so
/// callers only override what they need.
#[derive(Clone, Debug)]
pub struct NewGoal {
    pub chat_id: String,
    pub user_id: String,
    pub created_from_message_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: GoalStatus,
    pub priority: Priority,
    pub deadline: Option<DateTime<Utc>>,
}

impl NewGoal {
    pub fn new(chat_id: &str, user_id: &str, title: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
            created_from_message_id: None,
            title: title.to_string(),
            description: None,
            status: GoalStatus::NotStarted,
            priority: Priority::Medium,
            deadline: None,
        }
    }
}

/// Partial goal update. Omitted fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct GoalChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<GoalStatus>,
    pub priority: Option<Priority>,
    pub deadline: Option<DateTime<Utc>>,
}

/// One step of an incoming plan. `order` overrides the assigned sequence
/// when present.
#[derive(Clone, Debug)]
pub struct StepDraft {
    pub title: String,
    pub order: Option<i32>,
}

impl StepDraft {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            order: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StepChanges {
    pub title: Option<String>,
    pub is_completed: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct StepOrderChange {
    pub id: String,
    pub order: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepBulkChange {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_completed: Option<bool>,
    #[serde(default)]
    pub order: Option<i32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
    pub percentage: u32,
}

/// Result of plan extraction. Always usable: `extract` substitutes defaults
/// rather than failing.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ExtractedPlan {
    pub goal_title: String,
    pub description: Option<String>,
    pub steps: Vec<ExtractedStep>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ExtractedStep {
    pub title: String,
}
