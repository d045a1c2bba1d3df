use async_trait::async_trait;
use thiserror::Error;

use crate::pipeline::types::Task;

pub mod memory;

pub use memory::MemoryTaskStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(String),
    #[error("task {0} already exists")]
    Duplicate(String),
}

/// Mutation applied to one record under the store's write lock.
pub type TaskMutation = Box<dyn FnOnce(&mut Task) + Send>;

/// Record store owned by the process. Single-record updates are atomic with
/// respect to concurrent readers; no multi-key transactions are offered.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    async fn create(&self, task: Task) -> Result<(), StoreError>;

    async fn get(&self, task_id: &str) -> Result<Option<Task>, StoreError>;

    /// Applies `mutate` to the record if it exists and is not already in a
    /// terminal state. Late writes against terminal records are dropped and
    /// reported as `Ok(false)`.
    async fn update(&self, task_id: &str, mutate: TaskMutation) -> Result<bool, StoreError>;

    async fn delete(&self, task_id: &str) -> Result<(), StoreError>;

    /// All records; used only by batch-status queries and the janitor sweep.
    async fn list(&self) -> Result<Vec<Task>, StoreError>;

    async fn len(&self) -> usize;
}

#[cfg(test)]
mod tests;
