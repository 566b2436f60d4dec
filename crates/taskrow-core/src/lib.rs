mod config;
mod error;
mod events;
mod task;

pub use config::QueueConfig;
pub use error::{Result, TaskError};
pub use events::{EventBus, TaskEvent};
pub use task::{Task, TaskArgs, TaskId, TaskStatus};

/// Default ceiling for serialized task arguments (1 MiB).
pub const DEFAULT_MAX_ARGS_SIZE: usize = 1024 * 1024;

/// Default ceiling for accumulated task output (10 MiB).
pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 10 * 1024 * 1024;

/// Default wall-clock task timeout in seconds (1 hour).
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 3600;
