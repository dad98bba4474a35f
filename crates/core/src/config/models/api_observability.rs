use std::time::Duration;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
    /// 节点拉取指令时的最长等待时间
    pub long_poll_seconds: u64,
    pub max_archive_size_mb: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
            long_poll_seconds: 25,
            max_archive_size_mb: 512,
        }
    }
}

impl ApiConfig {
    pub fn long_poll(&self) -> Duration {
        Duration::from_secs(self.long_poll_seconds)
    }

    pub fn max_archive_bytes(&self) -> usize {
        self.max_archive_size_mb * 1024 * 1024
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.bind_address.is_empty(), "API绑定地址不能为空");
        ensure!(
            self.bind_address.parse::<std::net::SocketAddr>().is_ok(),
            "无效的API绑定地址: {}",
            self.bind_address
        );
        ensure!(self.max_archive_size_mb > 0, "压缩包大小上限必须大于0");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_enabled: bool,
    pub metrics_endpoint: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_endpoint: "/metrics".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        ensure!(
            valid_levels.contains(&self.log_level.to_lowercase().as_str()),
            "无效的日志级别: {}",
            self.log_level
        );
        ensure!(
            self.metrics_endpoint.starts_with('/'),
            "指标端点必须以 / 开头"
        );
        Ok(())
    }
}
