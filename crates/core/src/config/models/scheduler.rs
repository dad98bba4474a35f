use std::time::Duration;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 兜底调度周期
    pub schedule_interval_seconds: u64,
    /// 节点失联导致的最大重新排队次数
    pub max_retries: u32,
    /// 派发后等待节点确认执行的时长
    pub dispatch_ack_timeout_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            schedule_interval_seconds: 5,
            max_retries: 3,
            dispatch_ack_timeout_seconds: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_seconds)
    }

    pub fn dispatch_ack_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_ack_timeout_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.schedule_interval_seconds > 0, "调度周期必须大于0");
        ensure!(
            self.dispatch_ack_timeout_seconds > 0,
            "派发确认超时必须大于0"
        );
        Ok(())
    }
}

/// 心跳监控配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_seconds: u64,
    /// 连续错过多少次心跳后标记为SUSPECT
    pub missed_before_suspect: u32,
    /// 沉默超过该时长后标记为DEAD
    pub timeout_seconds: u64,
    /// DEAD节点保留时长，超过后从注册表移除
    pub dead_node_grace_seconds: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            missed_before_suspect: 3,
            timeout_seconds: 90,
            dead_node_grace_seconds: 300,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn suspect_after(&self) -> Duration {
        self.interval() * self.missed_before_suspect
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn dead_node_grace(&self) -> Duration {
        Duration::from_secs(self.dead_node_grace_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.interval_seconds > 0, "心跳间隔必须大于0");
        ensure!(self.missed_before_suspect > 0, "可疑阈值必须大于0");
        ensure!(
            self.suspect_after() < self.timeout(),
            "心跳超时({}s)必须大于可疑阈值({}s)",
            self.timeout_seconds,
            self.suspect_after().as_secs()
        );
        Ok(())
    }
}

/// 任务生命周期配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// 停止请求等待节点确认的时长，超时后强制终结
    pub stop_ack_timeout_seconds: u64,
    pub watchdog_interval_seconds: u64,
    /// 已结束任务的保留时长，为空时不自动清理
    pub task_retention_seconds: Option<u64>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_ack_timeout_seconds: 30,
            watchdog_interval_seconds: 5,
            task_retention_seconds: None,
        }
    }
}

impl LifecycleConfig {
    pub fn stop_ack_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_ack_timeout_seconds)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_seconds)
    }

    pub fn task_retention(&self) -> Option<Duration> {
        self.task_retention_seconds.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.stop_ack_timeout_seconds > 0, "停止确认超时必须大于0");
        ensure!(self.watchdog_interval_seconds > 0, "看门狗周期必须大于0");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_defaults() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.suspect_after(), Duration::from_secs(30));
        assert_eq!(config.timeout(), Duration::from_secs(90));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_heartbeat_timeout_must_exceed_suspect_window() {
        let config = HeartbeatConfig {
            timeout_seconds: 20,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lifecycle_retention() {
        let mut config = LifecycleConfig::default();
        assert_eq!(config.task_retention(), None);
        config.task_retention_seconds = Some(3600);
        assert_eq!(config.task_retention(), Some(Duration::from_secs(3600)));
    }
}
