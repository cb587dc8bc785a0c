use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::core::provider::OperationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    pub completed: usize,
    pub desired: usize,
}

/// One user-visible logical operation, however many upstream calls it takes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub kind: OperationKind,
    pub status: TaskStatus,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<TaskProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ordered per-task progress events. A terminal event is always the last one
/// a subscriber sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Queued,
    Running,
    Progress { completed: usize, desired: usize },
    Succeeded,
    Failed { message: String },
    Canceled,
}

impl TaskEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Queued => "queued",
            TaskEvent::Running => "running",
            TaskEvent::Progress { .. } => "progress",
            TaskEvent::Succeeded => "succeeded",
            TaskEvent::Failed { .. } => "failed",
            TaskEvent::Canceled => "canceled",
        }
    }

    /// The event a late subscriber receives for a task already in `status`.
    pub(crate) fn for_status(status: TaskStatus, error: Option<&str>) -> Self {
        match status {
            TaskStatus::Queued => TaskEvent::Queued,
            TaskStatus::Running => TaskEvent::Running,
            TaskStatus::Succeeded => TaskEvent::Succeeded,
            TaskStatus::Failed => TaskEvent::Failed {
                message: error.unwrap_or_default().to_string(),
            },
            TaskStatus::Canceled => TaskEvent::Canceled,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task {0} not found")]
    NotFound(String),

    #[error("task {id} cannot move from {} to {}", .from.as_str(), .to.as_str())]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task {id} is still {}; cancel it or wait for it to finish", .status.as_str())]
    NotFinished { id: String, status: TaskStatus },
}
