//! SQLite-backed task store over libsql.
//!
//! The claim primitive is a single `UPDATE ... RETURNING` statement, so the
//! selection and the queued→in-progress transition are one atomic write.
//! SQLite has no skip-locked read; the database write lock serializes
//! concurrent claimers instead, which is the blocking-lock degradation the
//! claim contract allows.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{params, Connection, Database};
use tracing::{debug, info};
use uuid::Uuid;

use taskrow_core::{Task, TaskArgs, TaskId, TaskStatus};

use crate::error::{Result, StoreError};
use crate::store::TaskStore;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        created TEXT NOT NULL,
        modified TEXT NOT NULL,
        callable TEXT NOT NULL,
        args TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'queued',
        output TEXT NOT NULL DEFAULT '',
        owner_pid INTEGER,
        error TEXT,
        log TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_tasks_status_modified ON tasks(status, modified);
"#;

const TASK_COLUMNS: &str = "id, created, modified, callable, args, status, output, owner_pid, error, log";

/// Durable task store backed by a local SQLite database.
///
/// `libsql::Connection` is `Send + Sync`; one connection is reused for all
/// operations. Multiple worker processes may open the same file: WAL mode
/// plus a busy timeout cover cross-process contention.
pub struct SqliteTaskStore {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl SqliteTaskStore {
    /// Open (or create) a local database file and initialize the schema
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = libsql::Builder::new_local(path).build().await?;
        let conn = db.connect()?;
        let store = SqliteTaskStore {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "task store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests)
    pub async fn open_in_memory() -> Result<Self> {
        let db = libsql::Builder::new_local(":memory:").build().await?;
        let conn = db.connect()?;
        let store = SqliteTaskStore {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        // PRAGMAs return rows, so they go through query()
        let mut rows = self.conn.query("PRAGMA journal_mode = WAL;", ()).await?;
        while rows.next().await?.is_some() {}
        let mut rows = self.conn.query("PRAGMA busy_timeout = 5000;", ()).await?;
        while rows.next().await?.is_some() {}

        self.conn.execute_batch(SCHEMA).await?;
        Ok(())
    }
}

/// Fixed-width RFC 3339 so `ORDER BY modified` compares correctly as text
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> std::result::Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidRow(format!("bad timestamp '{s}': {e}")))
}

/// NULL is a valid value for the optional columns; anything else that is
/// not the expected type is a corrupted row, not an absent one.
fn nullable_integer(row: &libsql::Row, idx: i32, column: &str) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        libsql::Value::Null => Ok(None),
        libsql::Value::Integer(n) => Ok(Some(n)),
        other => Err(StoreError::InvalidRow(format!(
            "expected integer or NULL in {column}, got {other:?}"
        ))),
    }
}

fn nullable_text(row: &libsql::Row, idx: i32, column: &str) -> Result<Option<String>> {
    match row.get_value(idx)? {
        libsql::Value::Null => Ok(None),
        libsql::Value::Text(s) => Ok(Some(s)),
        other => Err(StoreError::InvalidRow(format!(
            "expected text or NULL in {column}, got {other:?}"
        ))),
    }
}

/// Map a libsql row to a Task. Column order matches TASK_COLUMNS.
fn row_to_task(row: &libsql::Row) -> Result<Task> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(1)?;
    let modified_str: String = row.get(2)?;
    let callable: String = row.get(3)?;
    let args_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let output: String = row.get(6)?;
    let owner_pid = nullable_integer(row, 7, "owner_pid")?;
    let error = nullable_text(row, 8, "error")?;
    let log = nullable_text(row, 9, "log")?;

    let id = Uuid::parse_str(&id_str)
        .map_err(|e| StoreError::InvalidRow(format!("bad task id '{id_str}': {e}")))?;
    let args: TaskArgs = serde_json::from_str(&args_str)?;
    let status = TaskStatus::parse(&status_str)
        .map_err(|_| StoreError::InvalidRow(format!("bad status '{status_str}'")))?;

    Ok(Task {
        id,
        created: parse_datetime(&created_str)?,
        modified: parse_datetime(&modified_str)?,
        callable,
        args,
        status,
        output,
        owner_pid: owner_pid.map(|pid| pid as u32),
        error,
        log,
    })
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn insert(&self, task: &Task) -> Result<()> {
        let args = serde_json::to_string(&task.args)?;
        self.conn
            .execute(
                "INSERT INTO tasks (id, created, modified, callable, args, status, output, owner_pid, error, log)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    task.id.to_string(),
                    format_datetime(&task.created),
                    format_datetime(&task.modified),
                    task.callable.clone(),
                    args,
                    task.status.as_str(),
                    task.output.clone(),
                    task.owner_pid.map(|pid| pid as i64),
                    task.error.clone(),
                    task.log.clone(),
                ],
            )
            .await?;
        debug!(task_id = %task.id, callable = %task.callable, "task inserted");
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_task(&row)?)),
            None => Ok(None),
        }
    }

    async fn claim(&self, worker_pid: u32) -> Result<Option<Task>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "UPDATE tasks SET status = 'in_progress', owner_pid = ?1, modified = ?2
                     WHERE id = (
                         SELECT id FROM tasks WHERE status = 'queued'
                         ORDER BY modified ASC, id ASC LIMIT 1
                     )
                     RETURNING {TASK_COLUMNS}"
                ),
                params![worker_pid as i64, format_datetime(&Utc::now())],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let task = row_to_task(&row)?;
                debug!(task_id = %task.id, worker_pid, "task claimed");
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, task: &Task) -> Result<()> {
        let affected = self
            .conn
            .execute(
                "UPDATE tasks SET modified = ?1, status = ?2, output = ?3, owner_pid = ?4, error = ?5, log = ?6
                 WHERE id = ?7",
                params![
                    format_datetime(&task.modified),
                    task.status.as_str(),
                    task.output.clone(),
                    task.owner_pid.map(|pid| pid as i64),
                    task.error.clone(),
                    task.log.clone(),
                    task.id.to_string(),
                ],
            )
            .await?;
        if affected == 0 {
            return Err(StoreError::TaskNotFound(task.id));
        }
        Ok(())
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE status = ?1 ORDER BY modified ASC, id ASC"
                ),
                params![status.as_str()],
            )
            .await?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await? {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }

    async fn requeue(&self, id: TaskId) -> Result<()> {
        let affected = self
            .conn
            .execute(
                "UPDATE tasks SET status = 'queued', owner_pid = NULL, error = NULL,
                 output = '', log = NULL, modified = ?1 WHERE id = ?2",
                params![format_datetime(&Utc::now()), id.to_string()],
            )
            .await?;
        if affected == 0 {
            return Err(StoreError::TaskNotFound(id));
        }
        info!(task_id = %id, "task re-queued");
        Ok(())
    }

    async fn cancel(&self, id: TaskId) -> Result<()> {
        // Existence check first so a bad id is an error, not a silent no-op
        if self.get(id).await?.is_none() {
            return Err(StoreError::TaskNotFound(id));
        }
        self.conn
            .execute(
                "UPDATE tasks SET status = 'cancelled', owner_pid = NULL, modified = ?1
                 WHERE id = ?2 AND status IN ('queued', 'in_progress')",
                params![format_datetime(&Utc::now()), id.to_string()],
            )
            .await?;
        Ok(())
    }
}
