//! Parent-side subprocess execution.
//!
//! Each claimed task runs in a child process: the worker re-execs its own
//! binary with the hidden `exec-task` subcommand. A fault in the callable
//! can take down the child, but never the worker. The child's stdout and
//! stderr are piped back and stored as the task's `log`.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use taskrow_core::{EventBus, QueueConfig, Result, Task, TaskError, TaskEvent};
use taskrow_store::SharedStore;

use crate::monitor;

/// How the executor reaches the child entry point.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Binary to spawn; normally the worker's own executable
    pub worker_exe: PathBuf,
    /// Database path handed to the child
    pub database: PathBuf,
    /// Config file handed to the child, if the worker was started with one
    pub config_file: Option<PathBuf>,
    /// Window between SIGTERM and SIGKILL on timeout
    pub kill_grace: Duration,
}

impl ExecutorSettings {
    pub fn new(
        worker_exe: PathBuf,
        database: PathBuf,
        config_file: Option<PathBuf>,
        kill_grace: Duration,
    ) -> Self {
        ExecutorSettings {
            worker_exe,
            database,
            config_file,
            kill_grace,
        }
    }

    /// Settings that re-exec the currently running binary
    pub fn from_current_exe(
        database: PathBuf,
        config_file: Option<PathBuf>,
        kill_grace: Duration,
    ) -> std::io::Result<Self> {
        Ok(Self::new(
            std::env::current_exe()?,
            database,
            config_file,
            kill_grace,
        ))
    }
}

/// Runs claimed tasks in isolated subprocesses with timeout enforcement.
pub struct Executor {
    store: SharedStore,
    bus: Arc<EventBus>,
    config: QueueConfig,
    settings: ExecutorSettings,
}

impl Executor {
    pub fn new(
        store: SharedStore,
        bus: Arc<EventBus>,
        config: QueueConfig,
        settings: ExecutorSettings,
    ) -> Self {
        Executor {
            store,
            bus,
            config,
            settings,
        }
    }

    /// Execute a claimed task to a terminal state.
    ///
    /// Blocks until the child exits or the timeout escalation finishes; one
    /// task in flight per worker. Child-reported outcomes (success,
    /// exception) are written by the child itself; timeout, abnormal exit
    /// and the captured log are written here.
    pub async fn execute(&self, task: &Task) -> Result<()> {
        // Defensive allowlist re-validation before paying for a spawn
        if !self.config.is_task_allowed(&task.callable) {
            let message = TaskError::NotAllowed(task.callable.clone()).to_string();
            warn!(task_id = %task.id, callable = %task.callable, "refusing unlisted callable");
            if let Some(mut latest) = self.store.get(task.id).await.map_err(TaskError::from)? {
                if !latest.status.is_terminal() {
                    latest.fail(message.clone());
                    self.store.update(&latest).await.map_err(TaskError::from)?;
                    self.bus.emit(&TaskEvent::Failed {
                        task: latest,
                        error: Some(message),
                    });
                }
            }
            return Ok(());
        }

        info!(task_id = %task.id, callable = %task.callable, "spawning execution subprocess");

        let mut command = Command::new(&self.settings.worker_exe);
        command
            .arg("exec-task")
            .arg(task.id.to_string())
            .arg("--database")
            .arg(&self.settings.database)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(config_file) = &self.settings.config_file {
            command.arg("--config").arg(config_file);
        }

        let mut child = command.spawn()?;
        let child_pid = child.id();

        let stdout_reader = tokio::spawn(drain(child.stdout.take()));
        let stderr_reader = tokio::spawn(drain(child.stderr.take()));

        let exit = match self.config.timeout() {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Some(status?),
                Err(_elapsed) => {
                    warn!(task_id = %task.id, ?child_pid, "task exceeded timeout; terminating child");
                    self.terminate_child(&mut child, child_pid).await?;
                    None
                }
            },
            None => Some(child.wait().await?),
        };

        let mut log = String::new();
        if let Ok(captured) = stdout_reader.await {
            log.push_str(&captured);
        }
        if let Ok(captured) = stderr_reader.await {
            log.push_str(&captured);
        }

        match exit {
            None => {
                let timeout_secs = self.config.task_timeout_secs.unwrap_or_default();
                monitor::fail_on_timeout(self.store.as_ref(), &self.bus, task.id, timeout_secs)
                    .await?;
            }
            Some(status) if !status.success() => {
                warn!(task_id = %task.id, ?status, "execution subprocess exited abnormally");
                monitor::fail_on_subprocess_exit(
                    self.store.as_ref(),
                    &self.bus,
                    task.id,
                    status.code(),
                )
                .await?;
            }
            Some(_) => {}
        }

        if !log.is_empty() {
            if let Some(mut latest) = self.store.get(task.id).await.map_err(TaskError::from)? {
                latest.log = Some(log);
                latest.modified = chrono::Utc::now();
                self.store.update(&latest).await.map_err(TaskError::from)?;
            }
        }

        Ok(())
    }

    /// SIGTERM, wait out the kill grace, then SIGKILL
    async fn terminate_child(&self, child: &mut Child, child_pid: Option<u32>) -> Result<()> {
        if let Some(pid) = child_pid {
            if crate::process::terminate(pid)
                && tokio::time::timeout(self.settings.kill_grace, child.wait())
                    .await
                    .is_ok()
            {
                return Ok(());
            }
        }
        // Still alive after the grace period (or TERM was undeliverable)
        child.kill().await?;
        Ok(())
    }
}

async fn drain<R>(stream: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}
