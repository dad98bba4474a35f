use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::context::ScheduleTrigger;
use crate::matcher::Matcher;

/// 调度循环
///
/// 定时执行匹配，同时响应 [`ScheduleTrigger`] 的唤醒：新任务提交、节点恢复或释放后
/// 不必等到下一个周期。
pub struct SchedulerLoop {
    matcher: Arc<Matcher>,
    trigger: ScheduleTrigger,
    interval: Duration,
}

impl SchedulerLoop {
    pub fn new(matcher: Arc<Matcher>, trigger: ScheduleTrigger, interval: Duration) -> Self {
        Self {
            matcher,
            trigger,
            interval,
        }
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("调度循环启动, 周期: {:?}", self.interval);
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("调度循环收到关闭信号");
                    break;
                }
                _ = self.trigger.notified() => {
                    debug!("调度循环被唤醒");
                    self.pass().await;
                }
                _ = interval.tick() => {
                    self.pass().await;
                }
            }
        }
    }

    async fn pass(&self) {
        if let Err(e) = self.matcher.run_pass().await {
            error!("任务调度失败: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestPool;
    use nodepool_core::models::TaskStatus;
    use nodepool_testing_utils::TestEnv;

    #[tokio::test]
    async fn test_trigger_wakes_loop_before_interval() {
        let pool = TestPool::new();
        let scheduler = Arc::new(SchedulerLoop::new(
            pool.matcher.clone(),
            pool.ctx.trigger.clone(),
            Duration::from_secs(3600),
        ));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(shutdown_rx).await })
        };

        let task_id = pool.submit_default().await;
        pool.register("n1").await;

        let tasks = pool.ctx.tasks.clone();
        let scheduled = TestEnv::wait_for(
            || {
                let tasks = tasks.clone();
                let task_id = task_id.clone();
                async move {
                    matches!(tasks.get(&task_id).await, Ok(t) if t.status == TaskStatus::Scheduled)
                }
            },
            Duration::from_secs(2),
        )
        .await;
        assert!(scheduled);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
