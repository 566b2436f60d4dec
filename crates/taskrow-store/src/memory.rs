use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use taskrow_core::{Task, TaskId, TaskStatus};

use crate::error::{Result, StoreError};
use crate::store::TaskStore;

/// In-memory store for tests and single-process embedding.
///
/// The whole table sits behind one mutex, so a claim is trivially atomic:
/// selection and transition happen under the same lock. Not usable with the
/// subprocess execution path, which needs a store both processes can open.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        MemoryTaskStore {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, task: &Task) -> Result<()> {
        self.tasks.lock().insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.lock().get(&id).cloned())
    }

    async fn claim(&self, worker_pid: u32) -> Result<Option<Task>> {
        let mut tasks = self.tasks.lock();
        let oldest = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Queued)
            .min_by_key(|t| (t.modified, t.id))
            .map(|t| t.id);

        let Some(id) = oldest else {
            return Ok(None);
        };
        let Some(task) = tasks.get_mut(&id) else {
            return Ok(None);
        };
        task.claim(worker_pid);
        Ok(Some(task.clone()))
    }

    async fn update(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.lock();
        if !tasks.contains_key(&task.id) {
            return Err(StoreError::TaskNotFound(task.id));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        let tasks = self.tasks.lock();
        let mut matching: Vec<Task> = tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|t| (t.modified, t.id));
        Ok(matching)
    }

    async fn requeue(&self, id: TaskId) -> Result<()> {
        let mut tasks = self.tasks.lock();
        let task = tasks.get_mut(&id).ok_or(StoreError::TaskNotFound(id))?;
        task.requeue();
        Ok(())
    }

    async fn cancel(&self, id: TaskId) -> Result<()> {
        let mut tasks = self.tasks.lock();
        let task = tasks.get_mut(&id).ok_or(StoreError::TaskNotFound(id))?;
        if !task.status.is_terminal() {
            task.cancel();
        }
        Ok(())
    }
}
