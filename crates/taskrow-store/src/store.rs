use std::sync::Arc;

use async_trait::async_trait;

use taskrow_core::{QueueConfig, Task, TaskArgs, TaskError, TaskId, TaskStatus};

use crate::error::Result;

/// The row-claim / row-update contract every backing store implements.
///
/// The claim primitive is the only cross-worker coordination point in the
/// system: no two concurrent `claim` calls against the same store may ever
/// return the same task.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a newly created task
    async fn insert(&self, task: &Task) -> Result<()>;

    /// Pure read of a single task
    async fn get(&self, id: TaskId) -> Result<Option<Task>>;

    /// Atomically transition at most one queued task to in-progress,
    /// recording `worker_pid` as the owner. Rows are served oldest
    /// `modified` first. Returns `None` when no work is available.
    async fn claim(&self, worker_pid: u32) -> Result<Option<Task>>;

    /// Persist all mutable fields of the task as given
    async fn update(&self, task: &Task) -> Result<()>;

    /// All tasks currently in the given status, oldest `modified` first
    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>>;

    /// Operator re-queue: reset to queued, clearing owner, error, output
    /// and log. The only supported retry mechanism.
    async fn requeue(&self, id: TaskId) -> Result<()>;

    /// External terminal marker. Only affects queued or in-progress tasks
    /// and never interrupts a running execution.
    async fn cancel(&self, id: TaskId) -> Result<()>;
}

/// Shared handle used across worker components
pub type SharedStore = Arc<dyn TaskStore>;

/// Enqueue a unit of work.
///
/// Validates the callable against the allowlist and the serialized argument
/// size against the configured ceiling before any row is written; rejected
/// tasks are never created.
pub async fn create_task(
    store: &dyn TaskStore,
    config: &QueueConfig,
    callable: &str,
    args: TaskArgs,
) -> std::result::Result<TaskId, TaskError> {
    if !config.is_task_allowed(callable) {
        return Err(TaskError::NotAllowed(callable.to_string()));
    }

    let serialized = serde_json::to_string(&args)?;
    if serialized.len() > config.max_args_size {
        return Err(TaskError::ArgsTooLarge {
            max: config.max_args_size,
            actual: serialized.len(),
        });
    }

    let task = Task::new(callable, args);
    let id = task.id;
    store.insert(&task).await.map_err(TaskError::from)?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTaskStore;
    use serde_json::json;

    fn args_of(value: serde_json::Value) -> TaskArgs {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let store = MemoryTaskStore::new();
        let config = QueueConfig::default();

        let id = create_task(&store, &config, "reports.daily", args_of(json!({"x": 1})))
            .await
            .unwrap();

        let task = store.get(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert!(task.output.is_empty());
        assert!(task.error.is_none());
        assert_eq!(task.args.get("x"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_create_rejects_unlisted_callable() {
        let store = MemoryTaskStore::new();
        let config = QueueConfig {
            allowed_tasks: Some(["reports.daily".to_string()].into_iter().collect()),
            ..QueueConfig::default()
        };

        let err = create_task(&store, &config, "reports.weekly", TaskArgs::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::NotAllowed(_)));

        // Nothing was written
        assert!(store
            .list_by_status(TaskStatus::Queued)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_oversized_args() {
        let store = MemoryTaskStore::new();
        let config = QueueConfig {
            max_args_size: 32,
            ..QueueConfig::default()
        };

        let big = "x".repeat(64);
        let err = create_task(&store, &config, "reports.daily", args_of(json!({"blob": big})))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::ArgsTooLarge { max: 32, .. }));
    }
}
