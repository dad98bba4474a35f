use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::{NodeId, ResourceSpec, ResourceUsage, TaskId};

/// 节点健康状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeHealth {
    Healthy,
    Suspect,
    Dead,
}

/// 节点信任等级，未启用容器隔离的节点为低信任
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustLevel {
    Normal,
    Low,
}

impl TrustLevel {
    pub fn from_isolation(container_isolation: bool) -> Self {
        if container_isolation {
            TrustLevel::Normal
        } else {
            TrustLevel::Low
        }
    }
}

/// 节点注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRegistration {
    pub node_id: NodeId,
    #[serde(default)]
    pub hostname: Option<String>,
    pub capacity: ResourceSpec,
    #[serde(default = "default_container_isolation")]
    pub container_isolation: bool,
}

fn default_container_isolation() -> bool {
    true
}

/// 节点心跳
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeHeartbeat {
    #[serde(default)]
    pub reported_status: Option<String>,
    #[serde(default)]
    pub usage: Option<ResourceUsage>,
}

/// 工作节点记录
///
/// `last_seen` 和 `dead_since` 使用单调时钟，仅供心跳监控使用，不参与序列化。
/// `retired` 在记录被移出注册表时置位，持有旧句柄的调用方据此识别已移除的节点。
#[derive(Debug, Clone, Serialize)]
pub struct WorkerNode {
    pub id: NodeId,
    pub hostname: Option<String>,
    pub capacity: ResourceSpec,
    pub health: NodeHealth,
    pub trust_level: TrustLevel,
    pub reported_status: Option<String>,
    pub usage: Option<ResourceUsage>,
    pub current_task: Option<TaskId>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    #[serde(skip)]
    pub last_seen: Instant,
    #[serde(skip)]
    pub dead_since: Option<Instant>,
    #[serde(skip)]
    pub retired: bool,
}

impl WorkerNode {
    pub fn from_registration(registration: NodeRegistration, now: Instant) -> Self {
        let wall = Utc::now();
        Self {
            id: registration.node_id,
            hostname: registration.hostname,
            capacity: registration.capacity.normalized(),
            health: NodeHealth::Healthy,
            trust_level: TrustLevel::from_isolation(registration.container_isolation),
            reported_status: None,
            usage: None,
            current_task: None,
            last_heartbeat_at: wall,
            registered_at: wall,
            last_seen: now,
            dead_since: None,
            retired: false,
        }
    }

    /// 健康且空闲，可以接收新任务
    pub fn is_available(&self) -> bool {
        !self.retired && self.health == NodeHealth::Healthy && self.current_task.is_none()
    }

    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    /// 刷新存活时间并恢复为HEALTHY，返回是否从SUSPECT/DEAD恢复
    pub fn mark_alive(&mut self, now: Instant) -> bool {
        let recovered = self.health != NodeHealth::Healthy;
        self.health = NodeHealth::Healthy;
        self.dead_since = None;
        self.last_seen = now;
        self.last_heartbeat_at = Utc::now();
        recovered
    }

    pub fn record_heartbeat(&mut self, heartbeat: NodeHeartbeat, now: Instant) -> bool {
        if heartbeat.reported_status.is_some() {
            self.reported_status = heartbeat.reported_status;
        }
        if let Some(usage) = heartbeat.usage {
            self.usage = Some(usage.clamped());
        }
        self.mark_alive(now)
    }

    /// 按沉默时长评估健康状态；DEAD只能由新的心跳恢复
    pub fn assess_health(
        &self,
        now: Instant,
        suspect_after: Duration,
        timeout: Duration,
    ) -> NodeHealth {
        if self.health == NodeHealth::Dead {
            return NodeHealth::Dead;
        }
        let silence = self.silence(now);
        if silence >= timeout {
            NodeHealth::Dead
        } else if silence >= suspect_after {
            NodeHealth::Suspect
        } else {
            NodeHealth::Healthy
        }
    }

    pub fn mark_dead(&mut self, now: Instant) -> bool {
        if self.health == NodeHealth::Dead {
            return false;
        }
        self.health = NodeHealth::Dead;
        self.dead_since = Some(now);
        true
    }

    /// 释放节点上绑定的指定任务
    pub fn release(&mut self, task_id: &str) -> bool {
        if self.current_task.as_deref() == Some(task_id) {
            self.current_task = None;
            true
        } else {
            false
        }
    }
}

/// 节点查询过滤条件
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeFilter {
    pub health: Option<NodeHealth>,
    pub location: Option<String>,
    #[serde(default)]
    pub idle_only: bool,
}

impl NodeFilter {
    pub fn matches(&self, node: &WorkerNode) -> bool {
        self.health.map_or(true, |health| node.health == health)
            && self
                .location
                .as_deref()
                .map_or(true, |location| node.capacity.location.as_deref() == Some(location))
            && (!self.idle_only || node.current_task.is_none())
    }
}
