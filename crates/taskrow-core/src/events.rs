use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::RwLock;
use tracing::warn;

use crate::task::Task;

/// Lifecycle notification emitted around task execution.
///
/// Events carry a snapshot of the task at the moment of emission. They fire
/// in the process where the transition is decided: execution events in the
/// child, orphan/timeout/abnormal-exit failures in the worker parent.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// Fired before the callable runs
    Started { task: Task },
    /// Fired when a task reaches Completed
    Succeeded { task: Task },
    /// Fired on any failure path. `error` is `None` for orphan, timeout and
    /// abnormal-exit failures, which have no captured error to report.
    Failed { task: Task, error: Option<String> },
    /// Fired before each streamed chunk is appended (0-based index)
    IterationStarted { task: Task, iteration: usize },
    /// Fired after each streamed chunk is appended and persisted
    IterationFinished {
        task: Task,
        output: String,
        iteration: usize,
    },
}

impl TaskEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Started { .. } => "started",
            TaskEvent::Succeeded { .. } => "succeeded",
            TaskEvent::Failed { .. } => "failed",
            TaskEvent::IterationStarted { .. } => "iteration_started",
            TaskEvent::IterationFinished { .. } => "iteration_finished",
        }
    }

    pub fn task(&self) -> &Task {
        match self {
            TaskEvent::Started { task }
            | TaskEvent::Succeeded { task }
            | TaskEvent::Failed { task, .. }
            | TaskEvent::IterationStarted { task, .. }
            | TaskEvent::IterationFinished { task, .. } => task,
        }
    }
}

type Subscriber = Box<dyn Fn(&TaskEvent) + Send + Sync>;

/// Fire-and-forget fan-out for task lifecycle events.
///
/// Subscriber panics are caught and logged; they never affect task outcome.
/// No ordering guarantee across subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a subscriber for all lifecycle events
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&TaskEvent) + Send + Sync + 'static,
    {
        self.subscribers.write().push(Box::new(subscriber));
    }

    /// Deliver an event to every subscriber
    pub fn emit(&self, event: &TaskEvent) {
        let subscribers = self.subscribers.read();
        for subscriber in subscribers.iter() {
            if catch_unwind(AssertUnwindSafe(|| subscriber(event))).is_err() {
                warn!(
                    event = event.name(),
                    task_id = %event.task().id,
                    "event subscriber panicked; ignoring"
                );
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskArgs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_emit_reaches_all_subscribers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = count.clone();
            bus.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        let task = Task::new("reports.daily", TaskArgs::new());
        bus.emit(&TaskEvent::Started { task });
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_panicking_subscriber_does_not_poison_others() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.subscribe(|_| panic!("misbehaving subscriber"));
        let counter = count.clone();
        bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let task = Task::new("reports.daily", TaskArgs::new());
        bus.emit(&TaskEvent::Succeeded { task });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_event_carries_optional_error() {
        let bus = EventBus::new();
        let seen = Arc::new(RwLock::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(move |event| {
            if let TaskEvent::Failed { error, .. } = event {
                sink.write().push(error.clone());
            }
        });

        let task = Task::new("reports.daily", TaskArgs::new());
        bus.emit(&TaskEvent::Failed {
            task: task.clone(),
            error: Some("boom".into()),
        });
        bus.emit(&TaskEvent::Failed { task, error: None });

        let seen = seen.read();
        assert_eq!(seen.as_slice(), &[Some("boom".to_string()), None]);
    }
}
