//! 节点池调度核心
//!
//! 节点注册表、任务存储、资源匹配、心跳监控和生命周期协调，
//! 通过 [`NodePool`] 组装后供API层和后台循环使用。

pub mod cluster_stats;
pub mod context;
pub mod coordinator;
pub mod heartbeat_monitor;
pub mod matcher;
pub mod node_registry;
pub mod pool;
pub mod requeue;
pub mod scheduler;
pub mod task_store;
pub mod watchdog;

#[cfg(test)]
pub mod test_utils;

pub use cluster_stats::{ClusterHealth, ClusterStats, ResourceTotals, Utilization};
pub use context::{PoolContext, PoolSettings, ScheduleTrigger};
pub use coordinator::LifecycleCoordinator;
pub use heartbeat_monitor::{HealthScanReport, HeartbeatMonitor};
pub use matcher::{eligible_nodes, MatchReport, Matcher, PlacementStrategy, TightestFitStrategy};
pub use node_registry::NodeRegistry;
pub use pool::NodePool;
pub use requeue::RequeueService;
pub use scheduler::SchedulerLoop;
pub use task_store::TaskStore;
pub use watchdog::{LifecycleWatchdog, WatchdogReport};
