use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use taskrow_core::{QueueConfig, TaskError};

/// Worker process settings, loaded from a YAML file with CLI overrides.
///
/// The nested `queue` section carries the settings shared with the enqueue
/// side (allowlist, timeout, size ceilings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Lower bound of the randomized inter-poll sleep
    #[serde(default = "default_poll_min")]
    pub poll_interval_min_secs: u64,

    /// Upper bound of the randomized inter-poll sleep
    #[serde(default = "default_poll_max")]
    pub poll_interval_max_secs: u64,

    /// Window between SIGTERM and SIGKILL when a task times out
    #[serde(default = "default_kill_grace")]
    pub kill_grace_secs: u64,

    #[serde(default)]
    pub queue: QueueConfig,
}

fn default_poll_min() -> u64 {
    3
}

fn default_poll_max() -> u64 {
    9
}

fn default_kill_grace() -> u64 {
    5
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            poll_interval_min_secs: default_poll_min(),
            poll_interval_max_secs: default_poll_max(),
            kill_grace_secs: default_kill_grace(),
            queue: QueueConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: &Path) -> Result<Self, TaskError> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)
            .map_err(|e| TaskError::Other(format!("invalid config file: {e}")))?;
        Ok(config)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_min_secs, 3);
        assert_eq!(config.poll_interval_max_secs, 9);
        assert_eq!(config.kill_grace(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_file_with_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "poll_interval_min_secs: 1\nqueue:\n  task_timeout_secs: 30\n"
        )
        .unwrap();

        let config = WorkerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.poll_interval_min_secs, 1);
        assert_eq!(config.poll_interval_max_secs, 9);
        assert_eq!(config.queue.task_timeout_secs, Some(30));
        assert_eq!(config.queue.max_args_size, 1024 * 1024);
    }
}
