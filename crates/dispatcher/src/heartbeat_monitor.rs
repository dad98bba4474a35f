use std::collections::HashMap;
use std::sync::Arc;

use nodepool_core::models::{NodeHealth, NodeId};
use nodepool_core::{SchedulerError, SchedulerResult};
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::context::PoolContext;
use crate::node_registry::NodeRegistry;

/// 一次健康扫描的结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HealthScanReport {
    pub suspected: Vec<NodeId>,
    pub dead: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// 心跳监控
///
/// 按沉默时长推进节点健康状态：
///
/// - 沉默超过 `interval * missed_before_suspect`: HEALTHY → SUSPECT，不再接收新任务
/// - 沉默超过 `timeout`: → DEAD，持有的任务按节点失联重新排队
/// - DEAD超过 `dead_node_grace`: 从注册表移除
///
/// 恢复只由心跳或重新注册触发，监控本身不会把节点变回HEALTHY。
pub struct HeartbeatMonitor {
    ctx: Arc<PoolContext>,
    registry: Arc<NodeRegistry>,
}

impl HeartbeatMonitor {
    pub fn new(ctx: Arc<PoolContext>, registry: Arc<NodeRegistry>) -> Self {
        Self { ctx, registry }
    }

    pub async fn scan_once(&self) -> SchedulerResult<HealthScanReport> {
        let settings = &self.ctx.settings.heartbeat;
        let suspect_after = settings.suspect_after();
        let timeout = settings.timeout();
        let now = Instant::now();
        let mut report = HealthScanReport::default();

        for entry in self.ctx.nodes.entries().await? {
            let mut node = entry.lock().await;
            if node.retired {
                continue;
            }
            match node.assess_health(now, suspect_after, timeout) {
                NodeHealth::Suspect if node.health == NodeHealth::Healthy => {
                    node.health = NodeHealth::Suspect;
                    warn!(
                        "节点 {} 心跳沉默 {:?}, 标记为SUSPECT",
                        node.id,
                        node.silence(now)
                    );
                    report.suspected.push(node.id.clone());
                }
                NodeHealth::Dead if node.health != NodeHealth::Dead => {
                    report.dead.push(node.id.clone());
                }
                _ => {}
            }
        }

        // mark_dead 需要获取任务锁，必须在释放节点锁之后调用
        for node_id in &report.dead {
            match self.registry.mark_dead(node_id).await {
                Ok(outcome) => debug!("节点 {} 失联处理完成: {:?}", node_id, outcome),
                Err(SchedulerError::UnknownNode { .. }) => {}
                Err(e) => error!("处理失联节点 {} 失败: {}", node_id, e),
            }
        }

        report.removed = self.registry.remove_expired(settings.dead_node_grace()).await?;
        self.publish_health_gauges().await?;

        if !report.dead.is_empty() || !report.removed.is_empty() {
            info!(
                "健康扫描: {} 个节点失联, {} 个节点被移除",
                report.dead.len(),
                report.removed.len()
            );
        }
        Ok(report)
    }

    async fn publish_health_gauges(&self) -> SchedulerResult<()> {
        let mut counts: HashMap<NodeHealth, usize> = HashMap::new();
        for entry in self.ctx.nodes.entries().await? {
            let node = entry.lock().await;
            if !node.retired {
                *counts.entry(node.health).or_default() += 1;
            }
        }
        for health in [NodeHealth::Healthy, NodeHealth::Suspect, NodeHealth::Dead] {
            self.ctx
                .metrics
                .update_node_health(health, counts.get(&health).copied().unwrap_or(0));
        }
        Ok(())
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let period = self.ctx.settings.heartbeat.interval();
        info!("启动心跳监控, 扫描周期: {:?}", period);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("心跳监控收到关闭信号");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.scan_once().await {
                        error!("节点健康扫描失败: {}", e);
                    }
                }
            }
        }
    }
}
