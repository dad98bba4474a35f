//! 节点池指标采集
//!
//! 基于 `metrics` crate 注册计数器、仪表和直方图。未安装全局recorder时所有记录都是空操作。

use anyhow::Result;
use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use nodepool_core::models::{NodeHealth, TaskStatus};
use tracing::debug;

pub struct MetricsCollector {
    // 任务指标
    tasks_submitted_total: Counter,
    tasks_scheduled_total: Counter,
    tasks_requeued_total: Counter,
    dispatch_failures_total: Counter,
    task_execution_duration: Histogram,

    // 节点指标
    nodes_lost_total: Counter,

    // 调度性能指标
    pending_tasks: Gauge,
    scheduling_pass_duration: Histogram,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            tasks_submitted_total: counter!("nodepool_tasks_submitted_total"),
            tasks_scheduled_total: counter!("nodepool_tasks_scheduled_total"),
            tasks_requeued_total: counter!("nodepool_tasks_requeued_total"),
            dispatch_failures_total: counter!("nodepool_dispatch_failures_total"),
            task_execution_duration: histogram!("nodepool_task_execution_duration_seconds"),
            nodes_lost_total: counter!("nodepool_nodes_lost_total"),
            pending_tasks: gauge!("nodepool_pending_tasks"),
            scheduling_pass_duration: histogram!("nodepool_scheduling_pass_duration_seconds"),
        })
    }

    pub fn record_task_submitted(&self) {
        self.tasks_submitted_total.increment(1);
    }

    pub fn record_task_scheduled(&self, count: u64) {
        self.tasks_scheduled_total.increment(count);
    }

    pub fn record_task_requeued(&self, task_id: &str, retry_count: u32) {
        self.tasks_requeued_total.increment(1);
        debug!(task_id = task_id, retry_count = retry_count, "任务重新排队");
    }

    pub fn record_dispatch_failure(&self, node_id: &str) {
        self.dispatch_failures_total.increment(1);
        debug!(node_id = node_id, "指令派发失败");
    }

    /// 记录任务进入终态
    pub fn record_task_finished(&self, status: TaskStatus, duration_seconds: Option<f64>) {
        counter!("nodepool_tasks_finished_total", "status" => status.as_str()).increment(1);
        if let Some(duration) = duration_seconds {
            self.task_execution_duration.record(duration);
        }
    }

    pub fn record_node_lost(&self, node_id: &str) {
        self.nodes_lost_total.increment(1);
        debug!(node_id = node_id, "节点失联");
    }

    pub fn update_pending_tasks(&self, depth: usize) {
        self.pending_tasks.set(depth as f64);
    }

    pub fn update_node_health(&self, health: NodeHealth, count: usize) {
        let label = match health {
            NodeHealth::Healthy => "healthy",
            NodeHealth::Suspect => "suspect",
            NodeHealth::Dead => "dead",
        };
        gauge!("nodepool_nodes", "health" => label).set(count as f64);
    }

    pub fn record_scheduling_pass(&self, duration_seconds: f64) {
        self.scheduling_pass_duration.record(duration_seconds);
    }
}
