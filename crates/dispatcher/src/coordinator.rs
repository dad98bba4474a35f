use std::sync::Arc;

use nodepool_core::models::{NodeCommand, NodeHeartbeat, StopDisposition, Task};
use nodepool_core::SchedulerResult;
use tracing::{debug, info, warn};

use crate::context::PoolContext;
use crate::node_registry::NodeRegistry;
use crate::task_store::TaskStore;

/// 生命周期协调器
///
/// 把节点和客户端的请求映射到任务状态机上。所有操作对重复投递幂等，
/// 节点的每次上报同时视为一次心跳。
pub struct LifecycleCoordinator {
    ctx: Arc<PoolContext>,
    registry: Arc<NodeRegistry>,
    task_store: Arc<TaskStore>,
}

impl LifecycleCoordinator {
    pub fn new(
        ctx: Arc<PoolContext>,
        registry: Arc<NodeRegistry>,
        task_store: Arc<TaskStore>,
    ) -> Self {
        Self {
            ctx,
            registry,
            task_store,
        }
    }

    /// 节点确认开始执行：SCHEDULED → RUNNING
    pub async fn acknowledge_execute(&self, node_id: &str, task_id: &str) -> SchedulerResult<Task> {
        let task = {
            let entry = self.ctx.tasks.entry(task_id).await?;
            let mut task = entry.lock().await;
            if task.acknowledge(node_id)? {
                info!("节点 {} 开始执行任务 {}", node_id, task_id);
            } else {
                debug!("节点 {} 重复确认任务 {}", node_id, task_id);
            }
            task.clone()
        };
        self.touch_node(node_id).await;
        Ok(task)
    }

    /// 节点上报任务仍在运行，只刷新心跳，不改变任务状态
    pub async fn report_running(
        &self,
        node_id: &str,
        task_id: &str,
        heartbeat: NodeHeartbeat,
    ) -> SchedulerResult<Task> {
        let task = self.ctx.tasks.get(task_id).await?;
        task.ensure_reporter(node_id)?;
        self.registry.heartbeat(node_id, heartbeat).await?;
        Ok(task)
    }

    pub async fn report_output(
        &self,
        node_id: &str,
        task_id: &str,
        chunk: &str,
    ) -> SchedulerResult<()> {
        self.task_store.append_output(task_id, node_id, chunk).await?;
        self.touch_node(node_id).await;
        Ok(())
    }

    pub async fn report_logs(&self, node_id: &str, task_id: &str, chunk: &str) -> SchedulerResult<()> {
        self.task_store.append_logs(task_id, node_id, chunk).await?;
        self.touch_node(node_id).await;
        Ok(())
    }

    pub async fn report_completion(
        &self,
        node_id: &str,
        task_id: &str,
        result: Vec<u8>,
    ) -> SchedulerResult<Task> {
        let task = self.task_store.complete(task_id, node_id, result).await?;
        self.touch_node(node_id).await;
        Ok(task)
    }

    pub async fn report_failure(
        &self,
        node_id: &str,
        task_id: &str,
        reason: &str,
    ) -> SchedulerResult<Task> {
        let task = self.task_store.fail(task_id, node_id, reason).await?;
        self.touch_node(node_id).await;
        Ok(task)
    }

    /// 客户端请求停止
    ///
    /// 执行中的任务向节点发出停止指令；投递失败不影响停止请求本身，
    /// 由巡检在停止确认超时后强制终结。
    pub async fn request_stop(&self, task_id: &str) -> SchedulerResult<Task> {
        let (disposition, task) = self.task_store.request_stop(task_id).await?;
        if let StopDisposition::Signalled { node_id, repeated } = disposition {
            let command = NodeCommand::Stop {
                task_id: task_id.to_string(),
            };
            match self.ctx.notifier.dispatch(&node_id, command).await {
                Ok(()) if repeated => debug!("重复向节点 {} 发送任务 {} 的停止指令", node_id, task_id),
                Ok(()) => info!("已向节点 {} 发送任务 {} 的停止指令", node_id, task_id),
                Err(e) => warn!(
                    "向节点 {} 发送任务 {} 的停止指令失败, 等待超时兜底: {}",
                    node_id, task_id, e
                ),
            }
        }
        Ok(task)
    }

    /// 节点确认已停止
    pub async fn acknowledge_stop(&self, node_id: &str, task_id: &str) -> SchedulerResult<Task> {
        let task = self.task_store.finalize_stop(task_id, Some(node_id)).await?;
        self.touch_node(node_id).await;
        Ok(task)
    }

    /// 节点拉取任务压缩包，只允许当前分配的节点在执行阶段读取
    pub async fn fetch_payload(&self, node_id: &str, task_id: &str) -> SchedulerResult<Vec<u8>> {
        let task = self.ctx.tasks.get(task_id).await?;
        task.ensure_reporter(node_id)?;
        self.ctx.blobs.get_archive(&task.payload_ref).await
    }

    async fn touch_node(&self, node_id: &str) {
        if let Err(e) = self.registry.heartbeat(node_id, NodeHeartbeat::default()).await {
            debug!("刷新节点 {} 心跳失败: {}", node_id, e);
        }
    }
}
