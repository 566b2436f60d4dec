//! The per-worker control loop.
//!
//! Each poll cycle: sweep for orphans, claim at most one queued task,
//! execute it synchronously, then sleep a jittered interval so a fleet of
//! workers does not hammer the store in lockstep. Concurrency across tasks
//! comes from running multiple worker processes, not from this loop.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use taskrow_core::{EventBus, Result};
use taskrow_store::SharedStore;

use crate::config::WorkerConfig;
use crate::executor::{Executor, ExecutorSettings};
use crate::monitor::Monitor;
use crate::process;

/// A single polling worker. Its pid is the owner identity recorded on
/// every task it claims.
pub struct Worker {
    store: SharedStore,
    config: WorkerConfig,
    executor: Executor,
    monitor: Monitor,
    shutdown: Arc<Notify>,
    pid: u32,
}

impl Worker {
    pub fn new(
        store: SharedStore,
        bus: Arc<EventBus>,
        config: WorkerConfig,
        settings: ExecutorSettings,
    ) -> Self {
        let executor = Executor::new(
            store.clone(),
            bus.clone(),
            config.queue.clone(),
            settings,
        );
        let monitor = Monitor::new(store.clone(), bus);

        Worker {
            store,
            config,
            executor,
            monitor,
            shutdown: Arc::new(Notify::new()),
            pid: std::process::id(),
        }
    }

    /// Handle for signal handlers to request a graceful stop
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the poll loop until shutdown is requested.
    ///
    /// A misbehaving task can never break the loop: execution errors are
    /// logged and the next cycle proceeds. Claim errors count as "no work
    /// this cycle" and are retried naturally on the next poll.
    pub async fn run(&self) -> Result<()> {
        info!(pid = self.pid, "worker started");

        loop {
            if let Err(e) = self.monitor.sweep().await {
                warn!("orphan sweep failed: {e}");
            }

            match self.store.claim(self.pid).await {
                Ok(Some(task)) => {
                    info!(task_id = %task.id, callable = %task.callable, "claimed task");
                    if let Err(e) = self.executor.execute(&task).await {
                        error!(task_id = %task.id, "task execution errored: {e}");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("claim failed, treating as no work this cycle: {e}");
                }
            }

            debug!(
                rss_mb = process::resident_memory_mb(),
                "heartbeat"
            );

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!(pid = self.pid, "worker shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval()) => {}
            }
        }

        Ok(())
    }

    fn poll_interval(&self) -> Duration {
        let min = self.config.poll_interval_min_secs;
        let max = self.config.poll_interval_max_secs.max(min);
        let secs = rand::thread_rng().gen_range(min..=max);
        Duration::from_secs(secs)
    }
}
