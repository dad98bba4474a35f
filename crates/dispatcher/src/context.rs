use std::sync::Arc;

use nodepool_core::config::{AppConfig, HeartbeatConfig, LifecycleConfig, SchedulerConfig};
use nodepool_core::traits::{
    BlobStore, CostModel, CreditGate, NodeNotifier, NodeRepository, TaskRepository,
};
use nodepool_infrastructure::MetricsCollector;
use tokio::sync::Notify;
use tracing::warn;

/// 调度触发器
///
/// 任务进入PENDING、节点恢复HEALTHY或节点释放时调用 [`ScheduleTrigger::nudge`]，
/// 调度循环被唤醒后执行一轮匹配。多次触发会合并为一次。
#[derive(Clone, Default)]
pub struct ScheduleTrigger {
    notify: Arc<Notify>,
}

impl ScheduleTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nudge(&self) {
        self.notify.notify_one();
    }

    pub async fn notified(&self) {
        self.notify.notified().await
    }
}

/// 调度相关配置段
#[derive(Debug, Clone, Default)]
pub struct PoolSettings {
    pub scheduler: SchedulerConfig,
    pub heartbeat: HeartbeatConfig,
    pub lifecycle: LifecycleConfig,
}

impl From<&AppConfig> for PoolSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            scheduler: config.scheduler.clone(),
            heartbeat: config.heartbeat.clone(),
            lifecycle: config.lifecycle.clone(),
        }
    }
}

/// 节点池上下文
///
/// 持有所有存储和外部协作方，各服务通过它访问共享状态。
pub struct PoolContext {
    pub tasks: Arc<dyn TaskRepository>,
    pub nodes: Arc<dyn NodeRepository>,
    pub credit: Arc<dyn CreditGate>,
    pub blobs: Arc<dyn BlobStore>,
    pub notifier: Arc<dyn NodeNotifier>,
    pub cost_model: Arc<dyn CostModel>,
    pub metrics: Arc<MetricsCollector>,
    pub trigger: ScheduleTrigger,
    pub settings: PoolSettings,
}

impl PoolContext {
    /// 释放节点上绑定的指定任务，调用方可以持有该任务的锁
    pub(crate) async fn release_node(&self, node_id: &str, task_id: &str) -> bool {
        let Ok(entry) = self.nodes.entry(node_id).await else {
            return false;
        };
        let released = entry.lock().await.release(task_id);
        if released {
            self.trigger.nudge();
        }
        released
    }

    /// 释放任务未结算的积分预留，失败只记录日志
    pub(crate) async fn release_credit(&self, owner_id: &str, reserved: u64) {
        if let Err(e) = self.credit.release(owner_id, reserved).await {
            warn!("释放用户 {} 的积分预留 {} 失败: {}", owner_id, reserved, e);
        }
    }
}
