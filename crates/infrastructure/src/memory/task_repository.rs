use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use nodepool_core::errors::{SchedulerError, SchedulerResult};
use nodepool_core::models::{Task, TaskFilter, TaskId};
use nodepool_core::traits::{TaskEntry, TaskRepository};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// 内存任务仓储
#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<HashMap<TaskId, TaskEntry>>,
    sequence: AtomicU64,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn snapshot_entries(&self) -> Vec<TaskEntry> {
        self.tasks.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn insert(&self, task: Task) -> SchedulerResult<TaskEntry> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(SchedulerError::DuplicateTask { id: task.id });
        }
        let id = task.id.clone();
        let entry = Arc::new(Mutex::new(task));
        tasks.insert(id.clone(), entry.clone());
        debug!("任务记录已写入: {}", id);
        Ok(entry)
    }

    async fn entry(&self, task_id: &str) -> SchedulerResult<TaskEntry> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| SchedulerError::unknown_task(task_id))
    }

    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        let mut tasks = Vec::new();
        for entry in self.snapshot_entries().await {
            let task = entry.lock().await;
            if filter.matches(&task) {
                tasks.push(task.clone());
            }
        }
        tasks.sort_by_key(|task| task.queue_key());
        Ok(tasks)
    }

    async fn remove(&self, task_id: &str) -> SchedulerResult<()> {
        self.tasks
            .write()
            .await
            .remove(task_id)
            .map(|_| ())
            .ok_or_else(|| SchedulerError::unknown_task(task_id))
    }

    async fn count(&self) -> SchedulerResult<usize> {
        Ok(self.tasks.read().await.len())
    }
}
