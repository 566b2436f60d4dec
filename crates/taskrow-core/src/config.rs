use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_MAX_ARGS_SIZE, DEFAULT_MAX_OUTPUT_SIZE, DEFAULT_TASK_TIMEOUT_SECS};

/// Queue-wide settings consumed by both the enqueue path and the worker.
///
/// All fields are externally supplied; the defaults match the documented
/// ones (1 h timeout, 10 MiB output, 1 MiB args, no allowlist restriction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Callable names permitted for enqueue and execution.
    /// `None` means no restriction (a configuration choice, not a default
    /// assumption worth relying on in production).
    #[serde(default)]
    pub allowed_tasks: Option<HashSet<String>>,

    /// Wall-clock ceiling per execution attempt. `None` or `0` disables it.
    #[serde(default = "default_timeout")]
    pub task_timeout_secs: Option<u64>,

    /// Maximum accumulated output size in bytes
    #[serde(default = "default_max_output_size")]
    pub max_output_size: usize,

    /// Maximum serialized arguments size in bytes
    #[serde(default = "default_max_args_size")]
    pub max_args_size: usize,
}

fn default_timeout() -> Option<u64> {
    Some(DEFAULT_TASK_TIMEOUT_SECS)
}

fn default_max_output_size() -> usize {
    DEFAULT_MAX_OUTPUT_SIZE
}

fn default_max_args_size() -> usize {
    DEFAULT_MAX_ARGS_SIZE
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            allowed_tasks: None,
            task_timeout_secs: default_timeout(),
            max_output_size: default_max_output_size(),
            max_args_size: default_max_args_size(),
        }
    }
}

impl QueueConfig {
    /// Check whether a callable name is permitted
    pub fn is_task_allowed(&self, callable: &str) -> bool {
        match &self.allowed_tasks {
            Some(allowed) => allowed.contains(callable),
            None => true,
        }
    }

    /// Effective timeout, treating `Some(0)` as disabled
    pub fn timeout(&self) -> Option<Duration> {
        match self.task_timeout_secs {
            Some(secs) if secs > 0 => Some(Duration::from_secs(secs)),
            _ => None,
        }
    }
}
