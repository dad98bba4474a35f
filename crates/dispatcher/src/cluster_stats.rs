use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nodepool_core::models::{NodeFilter, NodeHealth, TaskFilter, TaskStatus, WorkerNode};
use nodepool_core::SchedulerResult;
use serde::Serialize;

use crate::context::PoolContext;

/// 资源合计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceTotals {
    pub memory_gb: f64,
    pub cpu_score: f64,
    pub gpu_score: f64,
    pub gpu_memory_gb: f64,
}

impl ResourceTotals {
    fn add(&mut self, node: &WorkerNode) {
        self.memory_gb += node.capacity.memory_gb;
        self.cpu_score += node.capacity.cpu_score;
        self.gpu_score += node.capacity.gpu_score;
        self.gpu_memory_gb += node.capacity.gpu_memory_gb;
    }
}

/// 资源利用率（百分比），无在线资源时为0
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Utilization {
    pub memory_percent: f64,
    pub cpu_percent: f64,
    pub gpu_percent: f64,
    pub gpu_memory_percent: f64,
}

fn used_percent(total: f64, available: f64) -> f64 {
    if total <= 0.0 {
        0.0
    } else {
        ((total - available) / total * 100.0).clamp(0.0, 100.0)
    }
}

/// 集群健康概览
#[derive(Debug, Clone, Serialize)]
pub struct ClusterHealth {
    pub total_nodes: usize,
    pub healthy_nodes: usize,
    pub suspect_nodes: usize,
    pub dead_nodes: usize,
    pub busy_nodes: usize,
    pub idle_nodes: usize,
    /// HEALTHY节点声明的容量合计
    pub total_resources: ResourceTotals,
    /// HEALTHY且空闲节点的容量合计
    pub available_resources: ResourceTotals,
    pub utilization: Utilization,
    pub tasks_by_status: BTreeMap<String, usize>,
    pub generated_at: DateTime<Utc>,
}

/// 集群统计
pub struct ClusterStats {
    ctx: Arc<PoolContext>,
}

impl ClusterStats {
    pub fn new(ctx: Arc<PoolContext>) -> Self {
        Self { ctx }
    }

    pub async fn snapshot(&self) -> SchedulerResult<ClusterHealth> {
        let nodes = self.ctx.nodes.list(&NodeFilter::default()).await?;
        let tasks = self.ctx.tasks.list(&TaskFilter::default()).await?;

        let mut health = ClusterHealth {
            total_nodes: nodes.len(),
            healthy_nodes: 0,
            suspect_nodes: 0,
            dead_nodes: 0,
            busy_nodes: 0,
            idle_nodes: 0,
            total_resources: ResourceTotals::default(),
            available_resources: ResourceTotals::default(),
            utilization: Utilization::default(),
            tasks_by_status: TaskStatus::ALL
                .iter()
                .map(|status| (status.as_str().to_string(), 0))
                .collect(),
            generated_at: Utc::now(),
        };

        for node in &nodes {
            match node.health {
                NodeHealth::Healthy => {
                    health.healthy_nodes += 1;
                    health.total_resources.add(node);
                    if node.current_task.is_none() {
                        health.available_resources.add(node);
                    }
                }
                NodeHealth::Suspect => health.suspect_nodes += 1,
                NodeHealth::Dead => health.dead_nodes += 1,
            }
            if node.current_task.is_some() {
                health.busy_nodes += 1;
            } else {
                health.idle_nodes += 1;
            }
        }

        let total = &health.total_resources;
        let available = &health.available_resources;
        health.utilization = Utilization {
            memory_percent: used_percent(total.memory_gb, available.memory_gb),
            cpu_percent: used_percent(total.cpu_score, available.cpu_score),
            gpu_percent: used_percent(total.gpu_score, available.gpu_score),
            gpu_memory_percent: used_percent(total.gpu_memory_gb, available.gpu_memory_gb),
        };

        for task in &tasks {
            *health
                .tasks_by_status
                .entry(task.status.as_str().to_string())
                .or_default() += 1;
        }
        Ok(health)
    }
}
