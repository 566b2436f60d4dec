use taskrow_core::{TaskError, TaskId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed task row: {0}")]
    InvalidRow(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for TaskError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TaskNotFound(id) => TaskError::TaskNotFound(id),
            other => TaskError::Store(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
