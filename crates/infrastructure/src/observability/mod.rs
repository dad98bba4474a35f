pub mod metrics_collector;

pub use metrics_collector::MetricsCollector;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// 安装Prometheus recorder，返回用于渲染 `/metrics` 的句柄
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("安装Prometheus指标recorder失败")?;
    info!("Prometheus指标已初始化");
    Ok(handle)
}
