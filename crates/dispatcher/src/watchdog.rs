use std::sync::Arc;

use nodepool_core::models::{RequeueOutcome, TaskFilter, TaskId, TaskStatus};
use nodepool_core::{SchedulerError, SchedulerResult};
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::context::PoolContext;
use crate::requeue::RequeueService;
use crate::task_store::TaskStore;

/// 一次巡检的结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchdogReport {
    /// 停止确认超时，被强制终结的任务
    pub forced_stops: Vec<TaskId>,
    /// 执行确认超时，被重新排队或判定失败的任务
    pub ack_timeouts: Vec<TaskId>,
    /// 超过保留期被清理的任务
    pub purged: Vec<TaskId>,
}

/// 生命周期巡检
///
/// 处理所有依赖节点配合、但节点可能永远不回应的等待：
/// 停止确认超时、执行确认超时，以及已结束任务的保留期清理。
pub struct LifecycleWatchdog {
    ctx: Arc<PoolContext>,
    task_store: Arc<TaskStore>,
    requeue: Arc<RequeueService>,
}

impl LifecycleWatchdog {
    pub fn new(
        ctx: Arc<PoolContext>,
        task_store: Arc<TaskStore>,
        requeue: Arc<RequeueService>,
    ) -> Self {
        Self {
            ctx,
            task_store,
            requeue,
        }
    }

    pub async fn sweep_once(&self) -> SchedulerResult<WatchdogReport> {
        let scheduler = &self.ctx.settings.scheduler;
        let lifecycle = &self.ctx.settings.lifecycle;
        let stop_ack_timeout = lifecycle.stop_ack_timeout();
        let dispatch_ack_timeout = scheduler.dispatch_ack_timeout();
        let now = Instant::now();
        let mut report = WatchdogReport::default();

        for task in self.ctx.tasks.list(&TaskFilter::default()).await? {
            if !task.status.is_active() {
                continue;
            }

            if task.stop_requested {
                let overdue = task
                    .stop_requested_instant
                    .is_some_and(|at| now.saturating_duration_since(at) >= stop_ack_timeout);
                if overdue {
                    match self.task_store.finalize_stop(&task.id, None).await {
                        Ok(stopped) if stopped.status == TaskStatus::Stopped => {
                            report.forced_stops.push(task.id.clone())
                        }
                        Ok(_) => {}
                        Err(SchedulerError::UnknownTask { .. }) => {}
                        Err(e) => warn!("强制停止任务 {} 失败: {}", task.id, e),
                    }
                }
                continue;
            }

            if task.status == TaskStatus::Scheduled {
                let overdue = task
                    .scheduled_instant
                    .is_some_and(|at| now.saturating_duration_since(at) >= dispatch_ack_timeout);
                let Some(node_id) = task.assigned_node.as_deref() else {
                    continue;
                };
                if overdue {
                    match self.requeue.handle_dispatch_timeout(node_id, &task.id).await {
                        Ok(RequeueOutcome::Unaffected) => {}
                        Ok(_) => report.ack_timeouts.push(task.id.clone()),
                        Err(SchedulerError::UnknownTask { .. }) => {}
                        Err(e) => warn!("处理任务 {} 的确认超时失败: {}", task.id, e),
                    }
                }
            }
        }

        if let Some(retention) = lifecycle.task_retention() {
            report.purged = self.task_store.purge_expired(retention).await?;
        }

        if !report.forced_stops.is_empty() || !report.ack_timeouts.is_empty() {
            info!(
                "生命周期巡检: 强制停止 {} 个任务, {} 个任务确认超时",
                report.forced_stops.len(),
                report.ack_timeouts.len()
            );
        }
        Ok(report)
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let period = self.ctx.settings.lifecycle.watchdog_interval();
        info!("启动生命周期巡检, 周期: {:?}", period);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("生命周期巡检收到关闭信号");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!("生命周期巡检失败: {}", e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestPool;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_ack_is_forced_after_timeout() {
        let pool = TestPool::new();
        pool.register("n1").await;
        let task_id = pool.submit_default().await;
        pool.start(&task_id, "n1").await;
        pool.task_store.request_stop(&task_id).await.unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(pool.watchdog.sweep_once().await.unwrap().forced_stops.is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        let report = pool.watchdog.sweep_once().await.unwrap();
        assert_eq!(report.forced_stops, vec![task_id.clone()]);
        assert_eq!(
            pool.ctx.tasks.get(&task_id).await.unwrap().status,
            TaskStatus::Stopped
        );
        assert!(pool.ctx.nodes.get("n1").await.unwrap().is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_ack_timeout_consumes_retry() {
        let pool = TestPool::new();
        pool.register("n1").await;
        let task_id = pool.submit_default().await;
        pool.bind(&task_id, "n1").await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(pool.watchdog.sweep_once().await.unwrap().ack_timeouts.is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        let report = pool.watchdog.sweep_once().await.unwrap();
        assert_eq!(report.ack_timeouts, vec![task_id.clone()]);
        let task = pool.ctx.tasks.get(&task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_task_is_not_timed_out() {
        let pool = TestPool::new();
        pool.register("n1").await;
        let task_id = pool.submit_default().await;
        pool.start(&task_id, "n1").await;

        tokio::time::advance(Duration::from_secs(3600)).await;
        let report = pool.watchdog.sweep_once().await.unwrap();
        assert_eq!(report, WatchdogReport::default());
        assert_eq!(
            pool.ctx.tasks.get(&task_id).await.unwrap().status,
            TaskStatus::Running
        );
    }
}
