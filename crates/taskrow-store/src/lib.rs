mod error;
mod memory;
mod sqlite;
mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryTaskStore;
pub use sqlite::SqliteTaskStore;
pub use store::{create_task, SharedStore, TaskStore};
