use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cluster_stats::ClusterStats;
use crate::context::PoolContext;
use crate::coordinator::LifecycleCoordinator;
use crate::heartbeat_monitor::HeartbeatMonitor;
use crate::matcher::Matcher;
use crate::node_registry::NodeRegistry;
use crate::requeue::RequeueService;
use crate::scheduler::SchedulerLoop;
use crate::task_store::TaskStore;
use crate::watchdog::LifecycleWatchdog;

/// 节点池
///
/// 组装所有服务的入口，API层和后台循环都通过它访问节点池。
pub struct NodePool {
    pub ctx: Arc<PoolContext>,
    pub requeue: Arc<RequeueService>,
    pub registry: Arc<NodeRegistry>,
    pub task_store: Arc<TaskStore>,
    pub matcher: Arc<Matcher>,
    pub coordinator: Arc<LifecycleCoordinator>,
    pub monitor: Arc<HeartbeatMonitor>,
    pub watchdog: Arc<LifecycleWatchdog>,
    pub stats: Arc<ClusterStats>,
    pub scheduler: Arc<SchedulerLoop>,
}

impl NodePool {
    pub fn new(ctx: PoolContext) -> Self {
        let ctx = Arc::new(ctx);
        let requeue = Arc::new(RequeueService::new(ctx.clone()));
        let registry = Arc::new(NodeRegistry::new(ctx.clone(), requeue.clone()));
        let task_store = Arc::new(TaskStore::new(ctx.clone()));
        let matcher = Arc::new(Matcher::new(ctx.clone(), requeue.clone()));
        let coordinator = Arc::new(LifecycleCoordinator::new(
            ctx.clone(),
            registry.clone(),
            task_store.clone(),
        ));
        let monitor = Arc::new(HeartbeatMonitor::new(ctx.clone(), registry.clone()));
        let watchdog = Arc::new(LifecycleWatchdog::new(
            ctx.clone(),
            task_store.clone(),
            requeue.clone(),
        ));
        let stats = Arc::new(ClusterStats::new(ctx.clone()));
        let scheduler = Arc::new(SchedulerLoop::new(
            matcher.clone(),
            ctx.trigger.clone(),
            ctx.settings.scheduler.schedule_interval(),
        ));

        Self {
            ctx,
            requeue,
            registry,
            task_store,
            matcher,
            coordinator,
            monitor,
            watchdog,
            stats,
            scheduler,
        }
    }

    /// 启动调度循环、心跳监控和生命周期巡检
    pub fn spawn_background(&self, shutdown_rx: &broadcast::Receiver<()>) -> Vec<JoinHandle<()>> {
        let scheduler = self.scheduler.clone();
        let scheduler_rx = shutdown_rx.resubscribe();
        let monitor = self.monitor.clone();
        let monitor_rx = shutdown_rx.resubscribe();
        let watchdog = self.watchdog.clone();
        let watchdog_rx = shutdown_rx.resubscribe();

        info!("启动节点池后台任务");
        vec![
            tokio::spawn(async move { scheduler.run(scheduler_rx).await }),
            tokio::spawn(async move { monitor.run(monitor_rx).await }),
            tokio::spawn(async move { watchdog.run(watchdog_rx).await }),
        ]
    }
}
