use std::sync::Arc;

use nodepool_core::models::{
    DispatchOrder, NodeCommand, NodeFilter, NodeHealth, NodeId, Task, TaskFilter, TaskId,
    TaskStatus, WorkerNode,
};
use nodepool_core::{SchedulerError, SchedulerResult};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::context::PoolContext;
use crate::requeue::RequeueService;

/// 节点选择策略
pub trait PlacementStrategy: Send + Sync {
    /// 对已通过硬性过滤的候选节点排序，越靠前越优先
    fn rank(&self, task: &Task, candidates: &mut [WorkerNode]);

    fn name(&self) -> &str;
}

/// 最紧凑匹配：GPU评分富余最小，其次CPU评分富余最小，最后按node_id
#[derive(Debug, Clone, Copy, Default)]
pub struct TightestFitStrategy;

impl PlacementStrategy for TightestFitStrategy {
    fn rank(&self, task: &Task, candidates: &mut [WorkerNode]) {
        candidates.sort_by(|a, b| {
            let sa = a.capacity.surplus_over(&task.requirements);
            let sb = b.capacity.surplus_over(&task.requirements);
            sa.gpu_score
                .total_cmp(&sb.gpu_score)
                .then_with(|| sa.cpu_score.total_cmp(&sb.cpu_score))
                .then_with(|| a.id.cmp(&b.id))
        });
    }

    fn name(&self) -> &str {
        "TightestFit"
    }
}

/// 满足任务需求的空闲健康节点
pub fn eligible_nodes(task: &Task, nodes: &[WorkerNode]) -> Vec<WorkerNode> {
    nodes
        .iter()
        .filter(|node| node.is_available() && node.capacity.satisfies(&task.requirements))
        .cloned()
        .collect()
}

/// 一轮匹配的结果
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MatchReport {
    pub scheduled: Vec<(TaskId, NodeId)>,
    pub dispatch_failures: Vec<(TaskId, NodeId)>,
    pub still_pending: usize,
}

enum BindOutcome {
    Bound(DispatchOrder),
    TaskUnavailable,
    NodeUnavailable,
}

/// 资源匹配器
///
/// 按FIFO顺序为PENDING任务挑选节点，先锁任务再锁节点完成原子绑定，
/// 绑定后通过节点通知器下发执行指令。匹配器本身不持有持久状态。
pub struct Matcher {
    ctx: Arc<PoolContext>,
    requeue: Arc<RequeueService>,
    strategy: Box<dyn PlacementStrategy>,
    pass_lock: Mutex<()>,
}

impl Matcher {
    pub fn new(ctx: Arc<PoolContext>, requeue: Arc<RequeueService>) -> Self {
        Self::with_strategy(ctx, requeue, Box::new(TightestFitStrategy))
    }

    pub fn with_strategy(
        ctx: Arc<PoolContext>,
        requeue: Arc<RequeueService>,
        strategy: Box<dyn PlacementStrategy>,
    ) -> Self {
        Self {
            ctx,
            requeue,
            strategy,
            pass_lock: Mutex::new(()),
        }
    }

    /// 执行一轮匹配
    pub async fn run_pass(&self) -> SchedulerResult<MatchReport> {
        let _pass = self.pass_lock.lock().await;
        let started = Instant::now();
        let mut report = MatchReport::default();

        let pending = self
            .ctx
            .tasks
            .list(&TaskFilter::with_status(TaskStatus::Pending))
            .await?;
        if pending.is_empty() {
            self.ctx.metrics.update_pending_tasks(0);
            return Ok(report);
        }

        let mut idle_nodes = self
            .ctx
            .nodes
            .list(&NodeFilter {
                health: Some(NodeHealth::Healthy),
                location: None,
                idle_only: true,
            })
            .await?;

        for task in &pending {
            let mut candidates = eligible_nodes(task, &idle_nodes);
            if candidates.is_empty() {
                debug!("任务 {} 暂无满足需求的空闲节点", task.id);
                report.still_pending += 1;
                continue;
            }
            self.strategy.rank(task, &mut candidates);

            let mut placed = None;
            for candidate in &candidates {
                match self.try_bind(&task.id, &candidate.id).await {
                    Ok(BindOutcome::Bound(order)) => {
                        placed = Some((candidate.id.clone(), order));
                        break;
                    }
                    Ok(BindOutcome::NodeUnavailable) => {
                        debug!("节点 {} 已不可用, 尝试下一个候选", candidate.id);
                        idle_nodes.retain(|node| node.id != candidate.id);
                    }
                    Ok(BindOutcome::TaskUnavailable) => break,
                    Err(e) => {
                        warn!("绑定任务 {} 到节点 {} 失败: {}", task.id, candidate.id, e);
                        break;
                    }
                }
            }

            let Some((node_id, order)) = placed else {
                if self.still_pending(&task.id).await {
                    report.still_pending += 1;
                }
                continue;
            };
            idle_nodes.retain(|node| node.id != node_id);

            match self.dispatch(&node_id, order).await {
                Ok(()) => {
                    info!(
                        "任务 {} 已调度到节点 {} (策略: {})",
                        task.id,
                        node_id,
                        self.strategy.name()
                    );
                    report.scheduled.push((task.id.clone(), node_id));
                }
                Err(e) => {
                    warn!("任务 {} 派发到节点 {} 失败: {}", task.id, node_id, e);
                    if let Err(e) = self.requeue.revert_dispatch(&node_id, &task.id).await {
                        warn!("撤销任务 {} 的绑定失败: {}", task.id, e);
                    }
                    report.dispatch_failures.push((task.id.clone(), node_id));
                    report.still_pending += 1;
                }
            }
        }

        self.ctx
            .metrics
            .record_task_scheduled(report.scheduled.len() as u64);
        self.ctx.metrics.update_pending_tasks(report.still_pending);
        self.ctx
            .metrics
            .record_scheduling_pass(started.elapsed().as_secs_f64());
        if !report.scheduled.is_empty() {
            info!(
                "本轮调度完成: 调度 {} 个任务, 剩余 {} 个等待",
                report.scheduled.len(),
                report.still_pending
            );
        }
        Ok(report)
    }

    async fn still_pending(&self, task_id: &str) -> bool {
        matches!(
            self.ctx.tasks.get(task_id).await,
            Ok(task) if task.status == TaskStatus::Pending
        )
    }

    /// 原子绑定：任务锁 → 节点锁
    async fn try_bind(&self, task_id: &str, node_id: &str) -> SchedulerResult<BindOutcome> {
        let task_entry = self.ctx.tasks.entry(task_id).await?;
        let node_entry = match self.ctx.nodes.entry(node_id).await {
            Ok(entry) => entry,
            Err(SchedulerError::UnknownNode { .. }) => return Ok(BindOutcome::NodeUnavailable),
            Err(e) => return Err(e),
        };

        let mut task = task_entry.lock().await;
        if task.status != TaskStatus::Pending {
            return Ok(BindOutcome::TaskUnavailable);
        }
        let mut node = node_entry.lock().await;
        if !node.is_available() || !node.capacity.satisfies(&task.requirements) {
            return Ok(BindOutcome::NodeUnavailable);
        }

        task.bind(node_id, Instant::now())?;
        node.current_task = Some(task.id.clone());
        Ok(BindOutcome::Bound(DispatchOrder {
            task_id: task.id.clone(),
            owner_id: task.owner_id.clone(),
            payload_ref: task.payload_ref.clone(),
            requirements: task.requirements.clone(),
        }))
    }

    async fn dispatch(&self, node_id: &str, order: DispatchOrder) -> SchedulerResult<()> {
        self.ctx
            .notifier
            .dispatch(node_id, NodeCommand::Execute(order))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestPool;
    use nodepool_core::models::ResourceSpec;
    use nodepool_testing_utils::{NodeRegistrationBuilder, TaskSubmissionBuilder};

    fn node(id: &str, gpu_score: f64, cpu_score: f64) -> WorkerNode {
        let registration = NodeRegistrationBuilder::new(id)
            .with_gpu_score(gpu_score)
            .with_cpu_score(cpu_score)
            .build();
        WorkerNode::from_registration(registration, Instant::now())
    }

    fn task_requiring(gpu_score: f64, cpu_score: f64) -> Task {
        Task::new(
            "t1".to_string(),
            "alice".to_string(),
            nodepool_core::models::BlobRef("archives/t1".to_string()),
            ResourceSpec {
                gpu_score,
                cpu_score,
                ..Default::default()
            },
            1,
            1,
        )
    }

    #[test]
    fn test_tightest_fit_ordering() {
        let task = task_requiring(50.0, 10.0);
        let mut candidates = vec![
            node("c", 60.0, 100.0),
            node("b", 60.0, 20.0),
            node("a", 90.0, 10.0),
            node("d", 60.0, 20.0),
        ];
        TightestFitStrategy.rank(&task, &mut candidates);
        let ids: Vec<_> = candidates.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "c", "a"]);
    }

    #[test]
    fn test_eligibility_excludes_busy_and_small_nodes() {
        let task = task_requiring(50.0, 0.0);
        let mut busy = node("busy", 80.0, 100.0);
        busy.current_task = Some("other".to_string());
        let mut suspect = node("suspect", 80.0, 100.0);
        suspect.health = NodeHealth::Suspect;
        let small = node("small", 40.0, 100.0);
        let fit = node("fit", 80.0, 100.0);

        let eligible = eligible_nodes(&task, &[busy, suspect, small, fit]);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, "fit");
    }

    #[tokio::test]
    async fn test_pass_schedules_fifo_and_dispatches() {
        let pool = TestPool::new();
        let first = pool.submit_default().await;
        let second = pool.submit_default().await;
        pool.register("n1").await;

        let report = pool.matcher.run_pass().await.unwrap();
        assert_eq!(report.scheduled, vec![(first.clone(), "n1".to_string())]);
        assert_eq!(report.still_pending, 1);

        let commands = pool.notifier.sent_to("n1");
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].task_id(), first);
        assert_eq!(
            pool.ctx.tasks.get(&second).await.unwrap().status,
            TaskStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_hard_label_filters() {
        let pool = TestPool::new();
        pool.registry
            .register(
                NodeRegistrationBuilder::new("n1")
                    .with_gpu_name("RTX4090")
                    .with_location("beijing")
                    .build(),
            )
            .await
            .unwrap();
        let wrong_gpu = pool
            .task_store
            .submit(TaskSubmissionBuilder::new().with_gpu_name("A100").build())
            .await
            .unwrap();
        let right_place = pool
            .task_store
            .submit(TaskSubmissionBuilder::new().with_location("beijing").build())
            .await
            .unwrap();

        let report = pool.matcher.run_pass().await.unwrap();
        assert_eq!(report.scheduled, vec![(right_place.id, "n1".to_string())]);
        assert_eq!(
            pool.ctx.tasks.get(&wrong_gpu.id).await.unwrap().status,
            TaskStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_dispatch_failure_reverts_binding() {
        let pool = TestPool::new();
        pool.register("n1").await;
        pool.notifier.set_unreachable("n1", true);
        let task_id = pool.submit_default().await;

        let report = pool.matcher.run_pass().await.unwrap();
        assert!(report.scheduled.is_empty());
        assert_eq!(report.dispatch_failures.len(), 1);

        let task = pool.ctx.tasks.get(&task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        let node = pool.ctx.nodes.get("n1").await.unwrap();
        assert_eq!(node.health, NodeHealth::Healthy);
        assert!(node.is_available());

        pool.notifier.set_unreachable("n1", false);
        let report = pool.matcher.run_pass().await.unwrap();
        assert_eq!(report.scheduled.len(), 1);
    }

    #[tokio::test]
    async fn test_never_assigns_to_busy_node() {
        let pool = TestPool::new();
        pool.register("n1").await;
        let first = pool.submit_default().await;
        pool.matcher.run_pass().await.unwrap();
        let second = pool.submit_default().await;

        let report = pool.matcher.run_pass().await.unwrap();
        assert!(report.scheduled.is_empty());
        assert_eq!(
            pool.ctx.nodes.get("n1").await.unwrap().current_task,
            Some(first)
        );
        assert_eq!(
            pool.ctx.tasks.get(&second).await.unwrap().status,
            TaskStatus::Pending
        );
    }
}
