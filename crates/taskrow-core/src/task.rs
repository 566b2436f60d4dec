use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TaskError;

/// Unique identifier for a task
pub type TaskId = Uuid;

/// Keyword arguments for a callable: string keys, JSON-compatible values
pub type TaskArgs = serde_json::Map<String, serde_json::Value>;

/// Task status in the queue system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting to be claimed by a worker
    Queued,
    /// Task has been claimed and is being executed
    InProgress,
    /// Task completed successfully
    Completed,
    /// Task failed (exception, timeout, crash, or orphaned worker)
    Failed,
    /// Task was cancelled externally before completing
    Cancelled,
}

impl TaskStatus {
    /// Storage form used by the database and CLI arguments
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Human-readable label for display surfaces
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "Queued",
            TaskStatus::InProgress => "In progress",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TaskError> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(TaskError::InvalidStatus(other.to_string())),
        }
    }

    /// Terminal states only leave via an explicit re-queue
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A unit of work stored as a durable row.
///
/// `callable` and `args` are immutable after creation; everything else is
/// execution state written back by exactly one worker at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,

    /// When the task was created
    pub created: DateTime<Utc>,

    /// Bumped on every state-affecting write; claim order is oldest-first
    pub modified: DateTime<Utc>,

    /// Dotted name of the registered callable (e.g. "reports.daily_digest")
    pub callable: String,

    /// Keyword arguments bound as named parameters in the child
    pub args: TaskArgs,

    /// Current status
    pub status: TaskStatus,

    /// Result text; appended to incrementally for streaming callables
    pub output: String,

    /// Pid of the worker currently executing this task
    pub owner_pid: Option<u32>,

    /// Diagnostic text; set only on the failure paths
    pub error: Option<String>,

    /// Captured stdout/stderr of the execution attempt
    pub log: Option<String>,
}

impl Task {
    /// Create a new queued task with empty result fields
    pub fn new(callable: impl Into<String>, args: TaskArgs) -> Self {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            created: now,
            modified: now,
            callable: callable.into(),
            args,
            status: TaskStatus::Queued,
            output: String::new(),
            owner_pid: None,
            error: None,
            log: None,
        }
    }

    /// Mark the task as claimed by a worker process
    pub fn claim(&mut self, worker_pid: u32) {
        self.status = TaskStatus::InProgress;
        self.owner_pid = Some(worker_pid);
        self.modified = Utc::now();
    }

    /// Mark the task as completed successfully
    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
        self.owner_pid = None;
        self.modified = Utc::now();
    }

    /// Mark the task as failed, appending to any existing diagnostic
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.error = Some(match self.error.take() {
            Some(prev) => format!("{prev}\n{message}"),
            None => message,
        });
        self.status = TaskStatus::Failed;
        self.owner_pid = None;
        self.modified = Utc::now();
    }

    /// Append a streamed output chunk
    pub fn append_output(&mut self, chunk: &str) {
        self.output.push_str(chunk);
        self.modified = Utc::now();
    }

    /// Reset a terminal task back to queued, clearing the previous attempt
    pub fn requeue(&mut self) {
        self.status = TaskStatus::Queued;
        self.owner_pid = None;
        self.error = None;
        self.output.clear();
        self.log = None;
        self.modified = Utc::now();
    }

    /// Mark the task as cancelled. Does not interrupt a running execution.
    pub fn cancel(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.owner_pid = None;
        self.modified = Utc::now();
    }

    /// Serialized size of the arguments in bytes
    pub fn args_size(&self) -> usize {
        serde_json::to_string(&self.args).map_or(0, |s| s.len())
    }
}
