//! Orphan detection and synthetic failure transitions.
//!
//! Execution subprocesses report exceptions themselves; everything that dies
//! without reporting (crashed worker, killed child, expired timeout) is
//! converted into a terminal Failed state here, in the worker parent.

use tracing::{debug, warn};

use taskrow_core::{EventBus, Result, TaskError, TaskEvent, TaskId, TaskStatus};
use taskrow_store::{SharedStore, TaskStore};

use crate::process;

/// Scans in-progress tasks for dead owners once per poll cycle.
pub struct Monitor {
    store: SharedStore,
    bus: std::sync::Arc<EventBus>,
}

impl Monitor {
    pub fn new(store: SharedStore, bus: std::sync::Arc<EventBus>) -> Self {
        Monitor { store, bus }
    }

    /// Reap tasks whose owning worker process no longer exists.
    ///
    /// Returns the number of tasks transitioned to Failed. Orphans have no
    /// captured error, so the failure event carries `None`.
    pub async fn sweep(&self) -> Result<usize> {
        let in_progress = self
            .store
            .list_by_status(TaskStatus::InProgress)
            .await
            .map_err(TaskError::from)?;

        let mut reaped = 0;
        for mut task in in_progress {
            let Some(pid) = task.owner_pid else {
                continue;
            };
            if process::alive(pid) {
                continue;
            }

            warn!(task_id = %task.id, pid, "reaping orphaned task");
            task.fail(format!(
                "Task failed: worker process (PID {pid}) no longer running"
            ));
            self.store.update(&task).await.map_err(TaskError::from)?;
            self.bus.emit(&TaskEvent::Failed { task, error: None });
            reaped += 1;
        }

        if reaped > 0 {
            debug!(reaped, "orphan sweep finished");
        }
        Ok(reaped)
    }
}

/// Mark a task as failed because its subprocess exceeded the wall-clock
/// ceiling. No-op if the task already left InProgress.
pub async fn fail_on_timeout(
    store: &dyn TaskStore,
    bus: &EventBus,
    task_id: TaskId,
    timeout_secs: u64,
) -> Result<()> {
    let Some(mut task) = store.get(task_id).await.map_err(TaskError::from)? else {
        return Err(TaskError::TaskNotFound(task_id));
    };
    if task.status != TaskStatus::InProgress {
        return Ok(());
    }

    task.fail(format!("Task timed out after {timeout_secs} seconds"));
    store.update(&task).await.map_err(TaskError::from)?;
    bus.emit(&TaskEvent::Failed { task, error: None });
    Ok(())
}

/// Mark a task as failed because its subprocess exited abnormally without
/// reporting an error (hard crash, external kill). No-op for a clean exit
/// or if the task already left InProgress.
pub async fn fail_on_subprocess_exit(
    store: &dyn TaskStore,
    bus: &EventBus,
    task_id: TaskId,
    exit_code: Option<i32>,
) -> Result<()> {
    if matches!(exit_code, Some(0)) {
        return Ok(());
    }
    let Some(mut task) = store.get(task_id).await.map_err(TaskError::from)? else {
        return Err(TaskError::TaskNotFound(task_id));
    };
    if task.status != TaskStatus::InProgress {
        return Ok(());
    }

    let message = match exit_code {
        Some(code) => format!("Worker subprocess exited with code {code}"),
        None => "Worker subprocess terminated by signal".to_string(),
    };
    task.fail(message);
    store.update(&task).await.map_err(TaskError::from)?;
    bus.emit(&TaskEvent::Failed { task, error: None });
    Ok(())
}
