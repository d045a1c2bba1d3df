use std::collections::HashMap;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::pipeline::types::Task;
use super::{StoreError, TaskMutation, TaskStore};

/// In-memory task store. The process owns every record; nothing survives a
/// restart, which matches the service's poll-and-delete contract.
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, task: Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::Duplicate(task.id));
        }
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn update(&self, task_id: &str, mutate: TaskMutation) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;

        if task.status.is_terminal() {
            // a stale in-flight pipeline may still try to write after the
            // janitor force-failed the record; drop the write
            warn!(task_id, status = %task.status, "dropping late write to terminal record");
            return Ok(false);
        }

        mutate(task);
        task.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete(&self, task_id: &str) -> Result<(), StoreError> {
        self.tasks
            .write()
            .await
            .remove(task_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.tasks.read().await.values().cloned().collect())
    }

    async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }
}
