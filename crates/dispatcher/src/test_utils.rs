//! 单元测试共用的节点池装配

use std::ops::Deref;
use std::sync::Arc;

use nodepool_core::config::AppConfig;
use nodepool_core::models::TaskId;
use nodepool_core::traits::ResourceWeightedCost;
use nodepool_infrastructure::{
    InMemoryBlobStore, InMemoryNodeRepository, InMemoryTaskRepository, MetricsCollector,
};
use nodepool_testing_utils::{
    MockCreditGate, NodeRegistrationBuilder, RecordingNotifier, TaskSubmissionBuilder,
};
use tokio::time::Instant;

use crate::context::{PoolContext, PoolSettings, ScheduleTrigger};
use crate::pool::NodePool;

/// 使用内存存储、可控积分网关和记录通知器的节点池
pub struct TestPool {
    pub pool: NodePool,
    pub credit: MockCreditGate,
    pub notifier: RecordingNotifier,
    pub blobs: Arc<InMemoryBlobStore>,
}

impl TestPool {
    pub fn new() -> Self {
        Self::with_config(&AppConfig::default())
    }

    pub fn with_config(config: &AppConfig) -> Self {
        let credit = MockCreditGate::new();
        let notifier = RecordingNotifier::new();
        let blobs = Arc::new(InMemoryBlobStore::new());
        let ctx = PoolContext {
            tasks: Arc::new(InMemoryTaskRepository::new()),
            nodes: Arc::new(InMemoryNodeRepository::new()),
            credit: Arc::new(credit.clone()),
            blobs: blobs.clone(),
            notifier: Arc::new(notifier.clone()),
            cost_model: Arc::new(ResourceWeightedCost),
            metrics: Arc::new(MetricsCollector::new().expect("metrics collector")),
            trigger: ScheduleTrigger::new(),
            settings: PoolSettings::from(config),
        };
        Self {
            pool: NodePool::new(ctx),
            credit,
            notifier,
            blobs,
        }
    }

    pub async fn register(&self, node_id: &str) {
        self.registry
            .register(NodeRegistrationBuilder::new(node_id).build())
            .await
            .expect("register node");
    }

    pub async fn submit_default(&self) -> TaskId {
        self.task_store
            .submit(TaskSubmissionBuilder::new().build())
            .await
            .expect("submit task")
            .id
    }

    /// 绕过匹配器直接绑定任务和节点
    pub async fn bind(&self, task_id: &str, node_id: &str) {
        let task_entry = self.ctx.tasks.entry(task_id).await.expect("task entry");
        let node_entry = self.ctx.nodes.entry(node_id).await.expect("node entry");
        let mut task = task_entry.lock().await;
        let mut node = node_entry.lock().await;
        task.bind(node_id, Instant::now()).expect("bind task");
        node.current_task = Some(task_id.to_string());
    }

    /// 绑定并确认执行，任务进入RUNNING
    pub async fn start(&self, task_id: &str, node_id: &str) {
        self.bind(task_id, node_id).await;
        let entry = self.ctx.tasks.entry(task_id).await.expect("task entry");
        entry
            .lock()
            .await
            .acknowledge(node_id)
            .expect("acknowledge task");
    }
}

impl Deref for TestPool {
    type Target = NodePool;

    fn deref(&self) -> &NodePool {
        &self.pool
    }
}
