//! Child-side task execution.
//!
//! This runs inside the isolated subprocess spawned by the executor (and
//! in-process in tests). It loads the task, runs the resolved callable with
//! the stored keyword arguments, and writes the terminal state back through
//! the store. Everything printed or logged here ends up in the task's `log`
//! via the parent's pipe capture.

use tracing::{info, warn};

use taskrow_core::{EventBus, QueueConfig, Result, Task, TaskError, TaskEvent, TaskId, TaskStatus};
use taskrow_store::TaskStore;

use crate::registry::{Callable, CallableRegistry};

/// Execute a claimed task to a terminal state.
///
/// Proceeds only while the task is Queued or InProgress; a task cancelled
/// between claim and spawn is left untouched. Callable errors become a
/// Failed task, never an error of this function; its own `Err` values are
/// store/lookup problems that make the subprocess exit non-zero, which the
/// parent classifies separately.
pub async fn run_task(
    store: &dyn TaskStore,
    registry: &CallableRegistry,
    bus: &EventBus,
    config: &QueueConfig,
    task_id: TaskId,
) -> Result<()> {
    let Some(mut task) = store.get(task_id).await.map_err(TaskError::from)? else {
        return Err(TaskError::TaskNotFound(task_id));
    };

    info!(task_id = %task.id, callable = %task.callable, "initiating task");
    if !matches!(task.status, TaskStatus::Queued | TaskStatus::InProgress) {
        info!(task_id = %task.id, status = %task.status, "task no longer runnable; skipping");
        return Ok(());
    }

    bus.emit(&TaskEvent::Started { task: task.clone() });

    // Enqueue already validated the allowlist; re-check defensively in case
    // the worker runs with a narrower configuration.
    if !config.is_task_allowed(&task.callable) {
        let message = TaskError::NotAllowed(task.callable.clone()).to_string();
        return finish_failed(store, bus, task, message).await;
    }

    let Some(callable) = registry.get(&task.callable) else {
        let message = TaskError::UnknownCallable(task.callable.clone()).to_string();
        return finish_failed(store, bus, task, message).await;
    };

    // Fresh attempt starts from empty output
    task.output.clear();
    store.update(&task).await.map_err(TaskError::from)?;

    let outcome = match callable {
        Callable::Single(f) => {
            let result = f(&task.args);
            run_single(store, config, &mut task, result).await?
        }
        Callable::Streaming(f) => {
            let chunks = f(&task.args);
            run_streaming(store, bus, config, &mut task, chunks).await?
        }
    };

    match outcome {
        Ok(()) => {
            task.complete();
            store.update(&task).await.map_err(TaskError::from)?;
            bus.emit(&TaskEvent::Succeeded { task: task.clone() });
            info!(task_id = %task.id, "finished task");
            Ok(())
        }
        Err(message) => {
            warn!(task_id = %task.id, error = %message, "task callable failed");
            finish_failed(store, bus, task, message).await
        }
    }
}

/// Callable-level outcome: Ok means the task completed its work
type Outcome = std::result::Result<(), String>;

async fn run_single(
    store: &dyn TaskStore,
    config: &QueueConfig,
    task: &mut Task,
    result: std::result::Result<String, String>,
) -> Result<Outcome> {
    match result {
        Ok(output) => {
            if output.len() > config.max_output_size {
                return Ok(Err(TaskError::OutputTooLarge {
                    max: config.max_output_size,
                }
                .to_string()));
            }
            task.output = output;
            task.modified = chrono::Utc::now();
            store.update(task).await.map_err(TaskError::from)?;
            Ok(Ok(()))
        }
        Err(message) => Ok(Err(message)),
    }
}

async fn run_streaming(
    store: &dyn TaskStore,
    bus: &EventBus,
    config: &QueueConfig,
    task: &mut Task,
    chunks: Box<dyn Iterator<Item = std::result::Result<String, String>> + Send>,
) -> Result<Outcome> {
    let mut iteration = 0usize;
    for chunk in chunks {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            // Partial output stays behind on a mid-stream failure
            Err(message) => return Ok(Err(message)),
        };

        bus.emit(&TaskEvent::IterationStarted {
            task: task.clone(),
            iteration,
        });

        if task.output.len() + chunk.len() > config.max_output_size {
            return Ok(Err(TaskError::OutputTooLarge {
                max: config.max_output_size,
            }
            .to_string()));
        }

        task.append_output(&chunk);
        store.update(task).await.map_err(TaskError::from)?;

        bus.emit(&TaskEvent::IterationFinished {
            task: task.clone(),
            output: chunk,
            iteration,
        });
        iteration += 1;
    }
    Ok(Ok(()))
}

async fn finish_failed(
    store: &dyn TaskStore,
    bus: &EventBus,
    mut task: Task,
    message: String,
) -> Result<()> {
    task.fail(message.clone());
    store.update(&task).await.map_err(TaskError::from)?;
    bus.emit(&TaskEvent::Failed {
        task,
        error: Some(message),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use taskrow_core::TaskArgs;
    use taskrow_store::{create_task, MemoryTaskStore};

    struct Harness {
        store: MemoryTaskStore,
        registry: CallableRegistry,
        bus: EventBus,
        config: QueueConfig,
    }

    impl Harness {
        fn new() -> Self {
            let registry = CallableRegistry::new();
            registry.register_fn("tests.hello", |_| Ok("hello".into()));
            registry.register_fn("tests.boom", |_| Err("boom".into()));
            registry.register_streaming("tests.abc", |_| {
                Box::new(
                    ["a\n", "b\n", "c"]
                        .into_iter()
                        .map(|s| Ok(s.to_string())),
                )
            });
            registry.register_streaming("tests.a_then_err", |_| {
                Box::new(
                    [Ok("a".to_string()), Err("stream broke".to_string())].into_iter(),
                )
            });

            Harness {
                store: MemoryTaskStore::new(),
                registry,
                bus: EventBus::new(),
                config: QueueConfig::default(),
            }
        }

        async fn enqueue_and_claim(&self, callable: &str) -> TaskId {
            let id = create_task(&self.store, &self.config, callable, TaskArgs::new())
                .await
                .unwrap();
            self.store.claim(std::process::id()).await.unwrap().unwrap();
            id
        }

        async fn run(&self, id: TaskId) {
            run_task(&self.store, &self.registry, &self.bus, &self.config, id)
                .await
                .unwrap();
        }

        async fn load(&self, id: TaskId) -> Task {
            self.store.get(id).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn test_single_value_task_completes() {
        let h = Harness::new();
        let id = h.enqueue_and_claim("tests.hello").await;
        h.run(id).await;

        let task = h.load(id).await;
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.output, "hello");
        assert!(task.error.is_none());
        assert!(task.owner_pid.is_none());
    }

    #[tokio::test]
    async fn test_failing_task_records_error() {
        let h = Harness::new();
        let id = h.enqueue_and_claim("tests.boom").await;
        h.run(id).await;

        let task = h.load(id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("boom"));
        assert_eq!(task.output, "");
    }

    #[tokio::test]
    async fn test_streaming_task_accumulates_with_hooks() {
        let h = Harness::new();
        let iterations = Arc::new(Mutex::new(Vec::new()));
        let sink = iterations.clone();
        h.bus.subscribe(move |event| {
            if let TaskEvent::IterationFinished {
                output, iteration, ..
            } = event
            {
                sink.lock().push((*iteration, output.clone()));
            }
        });

        let id = h.enqueue_and_claim("tests.abc").await;
        h.run(id).await;

        let task = h.load(id).await;
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.output, "a\nb\nc");

        let iterations = iterations.lock();
        assert_eq!(
            iterations.as_slice(),
            &[
                (0, "a\n".to_string()),
                (1, "b\n".to_string()),
                (2, "c".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_streaming_failure_keeps_partial_output() {
        let h = Harness::new();
        let id = h.enqueue_and_claim("tests.a_then_err").await;
        h.run(id).await;

        let task = h.load(id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.output, "a");
        assert_eq!(task.error.as_deref(), Some("stream broke"));
    }

    #[tokio::test]
    async fn test_unknown_callable_fails_with_typed_error() {
        let h = Harness::new();
        let id = create_task(&h.store, &h.config, "tests.missing", TaskArgs::new())
            .await
            .unwrap();
        h.store.claim(1).await.unwrap();
        h.run(id).await;

        let task = h.load(id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task
            .error
            .as_deref()
            .unwrap()
            .contains("No callable registered for 'tests.missing'"));
    }

    #[tokio::test]
    async fn test_allowlist_rechecked_at_execution() {
        let mut h = Harness::new();
        // Enqueued under a permissive config, executed under a narrow one
        let id = h.enqueue_and_claim("tests.hello").await;
        h.config.allowed_tasks = Some(Default::default());
        h.run(id).await;

        let task = h.load(id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.as_deref().unwrap().contains("allowlist"));
    }

    #[tokio::test]
    async fn test_cancelled_task_is_skipped() {
        let h = Harness::new();
        let started = Arc::new(Mutex::new(0usize));
        let sink = started.clone();
        h.bus.subscribe(move |event| {
            if matches!(event, TaskEvent::Started { .. }) {
                *sink.lock() += 1;
            }
        });

        let id = create_task(&h.store, &h.config, "tests.hello", TaskArgs::new())
            .await
            .unwrap();
        h.store.cancel(id).await.unwrap();
        h.run(id).await;

        let task = h.load(id).await;
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task.output.is_empty());
        assert_eq!(*started.lock(), 0);
    }

    #[tokio::test]
    async fn test_oversized_output_fails_the_attempt() {
        let mut h = Harness::new();
        h.config.max_output_size = 4;
        let id = h.enqueue_and_claim("tests.hello").await;
        h.run(id).await;

        let task = h.load(id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task
            .error
            .as_deref()
            .unwrap()
            .contains("exceeded maximum allowed size"));
    }

    #[tokio::test]
    async fn test_success_and_failure_hooks() {
        let h = Harness::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        h.bus.subscribe(move |event| {
            sink.lock().push(event.name());
        });

        let ok = h.enqueue_and_claim("tests.hello").await;
        h.run(ok).await;
        let bad = h.enqueue_and_claim("tests.boom").await;
        h.run(bad).await;

        let events = events.lock();
        assert_eq!(
            events.as_slice(),
            &["started", "succeeded", "started", "failed"]
        );
    }
}
