use std::sync::Arc;
use std::time::Duration;

use nodepool_core::models::{
    validate_identifier, NodeFilter, NodeHealth, NodeHeartbeat, NodeId, NodeRegistration,
    RequeueOutcome, WorkerNode,
};
use nodepool_core::{SchedulerError, SchedulerResult};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::context::PoolContext;
use crate::requeue::RequeueService;

/// 节点注册表
///
/// 节点记录的唯一所有者：注册、心跳、查询、标记死亡和过期移除。
pub struct NodeRegistry {
    ctx: Arc<PoolContext>,
    requeue: Arc<RequeueService>,
}

impl NodeRegistry {
    pub fn new(ctx: Arc<PoolContext>, requeue: Arc<RequeueService>) -> Self {
        Self { ctx, requeue }
    }

    /// 注册或替换节点
    ///
    /// - 新节点: 创建为HEALTHY
    /// - 已存在的HEALTHY节点: 容量相同则幂等（保留现有绑定），否则 `DuplicateNode`
    /// - 已存在的SUSPECT/DEAD节点: 其持有的任务先按节点失联处理，再替换记录
    pub async fn register(&self, registration: NodeRegistration) -> SchedulerResult<WorkerNode> {
        validate_identifier("节点ID", &registration.node_id)?;
        registration.capacity.validate()?;

        loop {
            let candidate = WorkerNode::from_registration(registration.clone(), Instant::now());
            let (entry, inserted) = self.ctx.nodes.get_or_insert(candidate.clone()).await?;
            if inserted {
                info!(
                    "节点注册成功: {} (内存: {}GB, GPU评分: {}, 信任等级: {:?})",
                    candidate.id,
                    candidate.capacity.memory_gb,
                    candidate.capacity.gpu_score,
                    candidate.trust_level
                );
                self.ctx.trigger.nudge();
                return Ok(candidate);
            }

            let held_task = {
                let mut node = entry.lock().await;
                if node.retired {
                    continue;
                }
                if node.health == NodeHealth::Healthy {
                    if node.capacity != candidate.capacity {
                        warn!("节点 {} 以不同的资源容量重复注册", node.id);
                        return Err(SchedulerError::DuplicateNode {
                            id: node.id.clone(),
                        });
                    }
                    node.hostname = candidate.hostname.clone();
                    node.trust_level = candidate.trust_level;
                    node.mark_alive(Instant::now());
                    debug!("节点 {} 重复注册, 保留现有绑定", node.id);
                    return Ok(node.clone());
                }
                node.current_task.clone()
            };

            if let Some(task_id) = &held_task {
                info!(
                    "节点 {} 在非健康状态下重新注册, 先回收其任务 {}",
                    candidate.id, task_id
                );
                self.reclaim(&candidate.id, task_id).await;
            }

            let mut node = entry.lock().await;
            if node.retired {
                continue;
            }
            if let Some(task_id) = &held_task {
                node.release(task_id);
            }
            node.capacity = candidate.capacity.clone();
            node.hostname = candidate.hostname.clone();
            node.trust_level = candidate.trust_level;
            node.reported_status = None;
            node.usage = None;
            node.registered_at = candidate.registered_at;
            node.mark_alive(Instant::now());
            info!("节点 {} 已重新注册为HEALTHY", node.id);
            self.ctx.trigger.nudge();
            return Ok(node.clone());
        }
    }

    async fn reclaim(&self, node_id: &str, task_id: &str) -> Option<RequeueOutcome> {
        match self.requeue.handle_node_loss(node_id, task_id).await {
            Ok(outcome) => Some(outcome),
            Err(SchedulerError::UnknownTask { .. }) => {
                debug!("节点 {} 持有的任务 {} 已不存在", node_id, task_id);
                None
            }
            Err(e) => {
                warn!("回收节点 {} 的任务 {} 失败: {}", node_id, task_id, e);
                None
            }
        }
    }

    /// 刷新心跳，SUSPECT/DEAD节点恢复为HEALTHY
    pub async fn heartbeat(
        &self,
        node_id: &str,
        heartbeat: NodeHeartbeat,
    ) -> SchedulerResult<WorkerNode> {
        let entry = self.ctx.nodes.entry(node_id).await?;
        let mut node = entry.lock().await;
        if node.retired {
            return Err(SchedulerError::unknown_node(node_id));
        }
        let previous = node.health;
        if node.record_heartbeat(heartbeat, Instant::now()) {
            info!("节点 {} 从 {:?} 恢复为HEALTHY", node_id, previous);
            self.ctx.trigger.nudge();
        }
        Ok(node.clone())
    }

    pub async fn get(&self, node_id: &str) -> SchedulerResult<WorkerNode> {
        let node = self.ctx.nodes.get(node_id).await?;
        if node.retired {
            return Err(SchedulerError::unknown_node(node_id));
        }
        Ok(node)
    }

    /// 按node_id排序的节点快照
    pub async fn list_nodes(&self, filter: &NodeFilter) -> SchedulerResult<Vec<WorkerNode>> {
        self.ctx.nodes.list(filter).await
    }

    /// 标记节点死亡并回收其任务，可重复调用
    pub async fn mark_dead(&self, node_id: &str) -> SchedulerResult<Option<RequeueOutcome>> {
        let entry = self.ctx.nodes.entry(node_id).await?;
        let held_task = {
            let mut node = entry.lock().await;
            if node.retired {
                return Err(SchedulerError::unknown_node(node_id));
            }
            if node.mark_dead(Instant::now()) {
                warn!(
                    "节点 {} 已标记为DEAD (沉默 {:?})",
                    node_id,
                    node.silence(Instant::now())
                );
                self.ctx.metrics.record_node_lost(node_id);
            }
            node.current_task.clone()
        };

        let outcome = match held_task {
            Some(task_id) => {
                let outcome = self.reclaim(node_id, &task_id).await;
                if outcome.is_none() || outcome == Some(RequeueOutcome::Unaffected) {
                    // 任务已不在该节点上，清理残留引用
                    entry.lock().await.release(&task_id);
                }
                outcome
            }
            None => None,
        };
        self.ctx.trigger.nudge();
        Ok(outcome)
    }

    /// 移除DEAD状态超过 `grace` 的节点
    pub async fn remove_expired(&self, grace: Duration) -> SchedulerResult<Vec<NodeId>> {
        let now = Instant::now();
        let mut expired = Vec::new();
        for entry in self.ctx.nodes.entries().await? {
            let node = entry.lock().await;
            let dead_long_enough = node
                .dead_since
                .is_some_and(|since| now.saturating_duration_since(since) >= grace);
            if node.health == NodeHealth::Dead && dead_long_enough && !node.retired {
                expired.push((node.id.clone(), node.current_task.clone()));
            }
        }

        let mut removed = Vec::new();
        for (node_id, held_task) in expired {
            if held_task.is_some() {
                self.mark_dead(&node_id).await?;
            }
            let predicate = |node: &WorkerNode| {
                node.health == NodeHealth::Dead
                    && node.current_task.is_none()
                    && node
                        .dead_since
                        .is_some_and(|since| now.saturating_duration_since(since) >= grace)
            };
            if self.ctx.nodes.remove_if(&node_id, &predicate).await? {
                self.ctx.notifier.forget(&node_id).await;
                info!("清理离线节点: {}", node_id);
                removed.push(node_id);
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestPool;
    use nodepool_core::models::{ResourceUsage, TaskStatus, TrustLevel};
    use nodepool_testing_utils::NodeRegistrationBuilder;

    #[tokio::test]
    async fn test_register_rejects_invalid_input() {
        let pool = TestPool::new();
        let empty_id = NodeRegistrationBuilder::new("").build();
        assert!(matches!(
            pool.registry.register(empty_id).await,
            Err(SchedulerError::InvalidInput(_))
        ));
        let negative = NodeRegistrationBuilder::new("n1").with_memory_gb(-1.0).build();
        assert!(matches!(
            pool.registry.register(negative).await,
            Err(SchedulerError::InvalidRequirements(_))
        ));
    }

    #[tokio::test]
    async fn test_register_is_idempotent_with_same_capacity() {
        let pool = TestPool::new();
        pool.register("n1").await;
        let task_id = pool.submit_default().await;
        pool.bind(&task_id, "n1").await;

        let again = pool
            .registry
            .register(NodeRegistrationBuilder::new("n1").build())
            .await
            .unwrap();
        assert_eq!(again.current_task.as_deref(), Some(task_id.as_str()));

        let different = NodeRegistrationBuilder::new("n1").with_gpu_score(10.0).build();
        assert!(matches!(
            pool.registry.register(different).await,
            Err(SchedulerError::DuplicateNode { .. })
        ));
    }

    #[tokio::test]
    async fn test_reregister_dead_node_requeues_held_task() {
        let pool = TestPool::new();
        pool.register("n1").await;
        let task_id = pool.submit_default().await;
        pool.bind(&task_id, "n1").await;
        {
            let entry = pool.ctx.nodes.entry("n1").await.unwrap();
            entry.lock().await.health = NodeHealth::Suspect;
        }

        let node = pool
            .registry
            .register(NodeRegistrationBuilder::new("n1").with_gpu_score(90.0).build())
            .await
            .unwrap();
        assert_eq!(node.health, NodeHealth::Healthy);
        assert_eq!(node.current_task, None);
        assert_eq!(node.capacity.gpu_score, 90.0);

        let task = pool.ctx.tasks.get(&task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_node() {
        let pool = TestPool::new();
        assert!(matches!(
            pool.registry.heartbeat("ghost", NodeHeartbeat::default()).await,
            Err(SchedulerError::UnknownNode { .. })
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_revives_dead_node() {
        let pool = TestPool::new();
        pool.register("n1").await;
        pool.registry.mark_dead("n1").await.unwrap();
        assert_eq!(pool.registry.get("n1").await.unwrap().health, NodeHealth::Dead);

        let node = pool
            .registry
            .heartbeat(
                "n1",
                NodeHeartbeat {
                    reported_status: Some("idle".to_string()),
                    usage: Some(ResourceUsage {
                        gpu_percent: -5.0,
                        ..Default::default()
                    }),
                },
            )
            .await
            .unwrap();
        assert_eq!(node.health, NodeHealth::Healthy);
        assert_eq!(node.reported_status.as_deref(), Some("idle"));
        assert_eq!(node.usage.map(|u| u.gpu_percent), Some(0.0));
    }

    #[tokio::test]
    async fn test_mark_dead_is_idempotent() {
        let pool = TestPool::new();
        pool.register("n1").await;
        let task_id = pool.submit_default().await;
        pool.bind(&task_id, "n1").await;

        let first = pool.registry.mark_dead("n1").await.unwrap();
        assert_eq!(first, Some(RequeueOutcome::Requeued));
        let second = pool.registry.mark_dead("n1").await.unwrap();
        assert_eq!(second, None);
        assert_eq!(pool.ctx.tasks.get(&task_id).await.unwrap().retry_count, 1);
    }

    #[tokio::test]
    async fn test_list_nodes_filters_and_orders() {
        let pool = TestPool::new();
        pool.registry
            .register(
                NodeRegistrationBuilder::new("n2")
                    .with_location("shanghai")
                    .without_isolation()
                    .build(),
            )
            .await
            .unwrap();
        pool.register("n1").await;
        pool.registry.mark_dead("n1").await.unwrap();

        let all = pool.registry.list_nodes(&NodeFilter::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2"]);
        assert_eq!(all[1].trust_level, TrustLevel::Low);

        let healthy = pool
            .registry
            .list_nodes(&NodeFilter {
                health: Some(NodeHealth::Healthy),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].id, "n2");

        let shanghai = pool
            .registry
            .list_nodes(&NodeFilter {
                location: Some("shanghai".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(shanghai.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_expired_after_grace() {
        let pool = TestPool::new();
        pool.register("n1").await;
        pool.registry.mark_dead("n1").await.unwrap();

        let grace = Duration::from_secs(300);
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(pool.registry.remove_expired(grace).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        let removed = pool.registry.remove_expired(grace).await.unwrap();
        assert_eq!(removed, vec!["n1".to_string()]);
        assert_eq!(pool.notifier.forgotten(), vec!["n1".to_string()]);
        assert!(matches!(
            pool.registry.heartbeat("n1", NodeHeartbeat::default()).await,
            Err(SchedulerError::UnknownNode { .. })
        ));
    }
}
