//! 数据仓储层接口定义
//!
//! - `TaskRepository` - 任务记录的存取
//! - `NodeRepository` - 节点记录的存取
//!
//! ## 锁粒度
//!
//! 仓储只负责维护 id → 记录句柄的映射。每条记录由独立的
//! `tokio::sync::Mutex` 保护，单条记录的所有修改都在该锁内完成：
//!
//! ```rust,ignore
//! let entry = tasks.entry("task-1").await?;
//! let mut task = entry.lock().await;
//! task.bind("node-1", Instant::now())?;
//! ```
//!
//! 跨实体操作先取任务锁再取节点锁，任何时候不同时持有两把任务锁或两把节点锁。
//! 仓储的映射锁只在查找/插入/移除期间短暂持有，持有记录锁时不得再访问映射。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::errors::SchedulerResult;
use crate::models::{NodeFilter, Task, TaskFilter, WorkerNode};

pub type TaskEntry = Arc<Mutex<Task>>;
pub type NodeEntry = Arc<Mutex<WorkerNode>>;

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 分配下一个提交序号
    fn next_sequence(&self) -> u64;

    /// 插入新任务，id已存在时返回 `DuplicateTask`
    async fn insert(&self, task: Task) -> SchedulerResult<TaskEntry>;

    /// 获取任务记录句柄，不存在时返回 `UnknownTask`
    async fn entry(&self, task_id: &str) -> SchedulerResult<TaskEntry>;

    /// 获取任务快照
    async fn get(&self, task_id: &str) -> SchedulerResult<Task> {
        let entry = self.entry(task_id).await?;
        let task = entry.lock().await;
        Ok(task.clone())
    }

    /// 按过滤条件返回快照，按 (created_at, sequence) 排序
    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>>;

    /// 移除任务记录
    async fn remove(&self, task_id: &str) -> SchedulerResult<()>;

    async fn count(&self) -> SchedulerResult<usize>;
}

#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// 插入节点；已存在时不覆盖，返回既有句柄和 `false`
    async fn get_or_insert(&self, node: WorkerNode) -> SchedulerResult<(NodeEntry, bool)>;

    /// 获取节点记录句柄，不存在时返回 `UnknownNode`
    async fn entry(&self, node_id: &str) -> SchedulerResult<NodeEntry>;

    async fn get(&self, node_id: &str) -> SchedulerResult<WorkerNode> {
        let entry = self.entry(node_id).await?;
        let node = entry.lock().await;
        Ok(node.clone())
    }

    /// 所有节点句柄，按node_id排序
    async fn entries(&self) -> SchedulerResult<Vec<NodeEntry>>;

    /// 按过滤条件返回快照，按node_id排序
    async fn list(&self, filter: &NodeFilter) -> SchedulerResult<Vec<WorkerNode>> {
        let mut nodes = Vec::new();
        for entry in self.entries().await? {
            let node = entry.lock().await;
            if !node.retired && filter.matches(&node) {
                nodes.push(node.clone());
            }
        }
        Ok(nodes)
    }

    /// 满足条件时移除节点并标记为 `retired`，返回是否移除
    async fn remove_if(
        &self,
        node_id: &str,
        predicate: &(dyn for<'n> Fn(&'n WorkerNode) -> bool + Send + Sync),
    ) -> SchedulerResult<bool>;
}
