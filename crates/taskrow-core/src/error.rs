use thiserror::Error;

use crate::task::TaskId;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task '{0}' is not on the configured allowlist")]
    NotAllowed(String),

    #[error("Arguments exceed maximum allowed size of {max} bytes (got {actual})")]
    ArgsTooLarge { max: usize, actual: usize },

    #[error("Task output exceeded maximum allowed size of {max} bytes")]
    OutputTooLarge { max: usize },

    #[error("No callable registered for '{0}'")]
    UnknownCallable(String),

    #[error("Task timed out after {0} seconds")]
    Timeout(u64),

    #[error("Worker subprocess exited with code {0}")]
    SubprocessExit(i32),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Invalid task status: {0}")]
    InvalidStatus(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TaskError>;
