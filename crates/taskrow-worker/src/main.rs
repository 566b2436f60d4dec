use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskrow_core::{EventBus, TaskArgs, TaskId};
use taskrow_store::{create_task, SharedStore, SqliteTaskStore, TaskStore};
use taskrow_worker::{demo, run_task, CallableRegistry, ExecutorSettings, Worker, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "taskrow")]
#[command(about = "Database-backed background task queue", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the polling worker
    Run {
        /// Path to the SQLite task database
        #[arg(long, default_value = "taskrow.db")]
        database: PathBuf,

        /// Path to a YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Enqueue a task
    Enqueue {
        /// Registered callable name, e.g. demo.echo
        callable: String,

        /// Keyword arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,

        #[arg(long, default_value = "taskrow.db")]
        database: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print a task's full state
    Show {
        task_id: TaskId,

        #[arg(long, default_value = "taskrow.db")]
        database: PathBuf,
    },

    /// Put a finished or stuck task back in the queue
    Requeue {
        task_id: TaskId,

        #[arg(long, default_value = "taskrow.db")]
        database: PathBuf,
    },

    /// Cancel a queued or in-progress task
    Cancel {
        task_id: TaskId,

        #[arg(long, default_value = "taskrow.db")]
        database: PathBuf,
    },

    /// Child entry point used by the worker to isolate task execution
    #[command(hide = true, name = "exec-task")]
    ExecTask {
        task_id: TaskId,

        #[arg(long)]
        database: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match args.command {
        Command::Run { database, config } => run_worker(database, config).await,
        Command::Enqueue {
            callable,
            args,
            database,
            config,
        } => enqueue(callable, args, database, config).await,
        Command::Show { task_id, database } => show(task_id, database).await,
        Command::Requeue { task_id, database } => requeue(task_id, database).await,
        Command::Cancel { task_id, database } => cancel(task_id, database).await,
        Command::ExecTask {
            task_id,
            database,
            config,
        } => exec_task(task_id, database, config).await,
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<WorkerConfig> {
    match path {
        Some(path) => Ok(WorkerConfig::from_file(path)?),
        None => Ok(WorkerConfig::default()),
    }
}

async fn open_store(database: &PathBuf) -> anyhow::Result<SharedStore> {
    let store = SqliteTaskStore::open(database).await?;
    Ok(Arc::new(store))
}

async fn run_worker(database: PathBuf, config_file: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_file.as_ref())?;
    let store = open_store(&database).await?;
    let bus = Arc::new(EventBus::new());

    let settings =
        ExecutorSettings::from_current_exe(database, config_file, config.kill_grace())?;
    let worker = Worker::new(store, bus, config, settings);

    // Handle shutdown signals
    let shutdown = worker.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal");
        shutdown.notify_one();
    });

    worker.run().await?;
    Ok(())
}

async fn enqueue(
    callable: String,
    args: String,
    database: PathBuf,
    config_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = load_config(config_file.as_ref())?;
    let store = open_store(&database).await?;

    let args: TaskArgs = match serde_json::from_str(&args)? {
        serde_json::Value::Object(map) => map,
        _ => anyhow::bail!("--args must be a JSON object"),
    };

    let task_id = create_task(store.as_ref(), &config.queue, &callable, args).await?;
    println!("{task_id}");
    Ok(())
}

async fn show(task_id: TaskId, database: PathBuf) -> anyhow::Result<()> {
    let store = open_store(&database).await?;
    let Some(task) = store.get(task_id).await? else {
        anyhow::bail!("task {task_id} not found");
    };
    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}

async fn requeue(task_id: TaskId, database: PathBuf) -> anyhow::Result<()> {
    let store = open_store(&database).await?;
    store.requeue(task_id).await?;
    tracing::info!(%task_id, "task requeued");
    Ok(())
}

async fn cancel(task_id: TaskId, database: PathBuf) -> anyhow::Result<()> {
    let store = open_store(&database).await?;
    store.cancel(task_id).await?;
    tracing::info!(%task_id, "task cancelled");
    Ok(())
}

/// Runs inside the execution subprocess; everything printed here is captured
/// by the parent as the task's log.
async fn exec_task(
    task_id: TaskId,
    database: PathBuf,
    config_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = load_config(config_file.as_ref())?;
    let store = open_store(&database).await?;
    let bus = EventBus::new();

    let registry = CallableRegistry::new();
    demo::register(&registry);

    run_task(store.as_ref(), &registry, &bus, &config.queue, task_id).await?;
    Ok(())
}
