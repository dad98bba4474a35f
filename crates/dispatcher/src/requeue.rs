use std::sync::Arc;

use nodepool_core::models::{RequeueOutcome, TaskStatus};
use nodepool_core::SchedulerResult;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::context::PoolContext;

/// 重新排队服务
///
/// 节点失联、派发确认超时和派发失败三种情况下把任务从节点上解绑。
/// 前两种消耗重试次数，派发失败不消耗。
pub struct RequeueService {
    ctx: Arc<PoolContext>,
}

impl RequeueService {
    pub fn new(ctx: Arc<PoolContext>) -> Self {
        Self { ctx }
    }

    /// 节点失联时处理其持有的任务
    pub async fn handle_node_loss(
        &self,
        node_id: &str,
        task_id: &str,
    ) -> SchedulerResult<RequeueOutcome> {
        self.unbind(node_id, task_id, "节点失联", false).await
    }

    /// 派发后未在超时内收到执行确认，只处理仍为SCHEDULED的任务
    pub async fn handle_dispatch_timeout(
        &self,
        node_id: &str,
        task_id: &str,
    ) -> SchedulerResult<RequeueOutcome> {
        self.unbind(node_id, task_id, "等待执行确认超时", true).await
    }

    async fn unbind(
        &self,
        node_id: &str,
        task_id: &str,
        cause: &str,
        scheduled_only: bool,
    ) -> SchedulerResult<RequeueOutcome> {
        let max_retries = self.ctx.settings.scheduler.max_retries;
        let entry = self.ctx.tasks.entry(task_id).await?;
        let mut task = entry.lock().await;
        // 巡检快照之后节点可能已确认执行
        let outcome = if scheduled_only && task.status != TaskStatus::Scheduled {
            RequeueOutcome::Unaffected
        } else {
            task.requeue_after_loss(node_id, max_retries, cause, Instant::now())
        };
        if outcome != RequeueOutcome::Unaffected {
            self.ctx.release_node(node_id, task_id).await;
        }

        match outcome {
            RequeueOutcome::Requeued => {
                info!(
                    "任务 {} 因{}重新排队 (节点: {}, 重试次数: {})",
                    task_id, cause, node_id, task.retry_count
                );
                self.ctx
                    .metrics
                    .record_task_requeued(task_id, task.retry_count);
                self.ctx.trigger.nudge();
            }
            RequeueOutcome::Exhausted => {
                warn!(
                    "任务 {} 因{}重试次数耗尽, 标记为失败 (节点: {})",
                    task_id, cause, node_id
                );
                self.ctx.metrics.record_task_finished(task.status, None);
                self.ctx
                    .release_credit(&task.owner_id, task.estimated_cost)
                    .await;
            }
            RequeueOutcome::Stopped => {
                info!("任务 {} 已请求停止, 节点 {} {}后直接终止", task_id, node_id, cause);
                self.ctx.metrics.record_task_finished(task.status, None);
                self.ctx
                    .release_credit(&task.owner_id, task.estimated_cost)
                    .await;
            }
            RequeueOutcome::Unaffected => {
                debug!("任务 {} 已不在节点 {} 上, 跳过重新排队", task_id, node_id);
            }
        }
        Ok(outcome)
    }

    /// 派发失败时撤销绑定，不消耗重试次数也不影响节点健康状态
    pub async fn revert_dispatch(&self, node_id: &str, task_id: &str) -> SchedulerResult<bool> {
        let entry = self.ctx.tasks.entry(task_id).await?;
        let mut task = entry.lock().await;
        let reverted = task.revert_dispatch(node_id);
        if reverted {
            self.ctx.release_node(node_id, task_id).await;
            self.ctx.metrics.record_dispatch_failure(node_id);
            info!("任务 {} 派发到节点 {} 失败, 已撤销绑定", task_id, node_id);
        }
        Ok(reverted)
    }
}
