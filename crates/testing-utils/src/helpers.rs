//! 通用测试辅助

use std::time::Duration;

use tokio::time::{sleep, Instant};

pub struct TestEnv;

impl TestEnv {
    /// 轮询等待条件成立，超时返回 `false`
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        condition().await
    }

    pub fn unique_name(prefix: &str) -> String {
        let timestamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
        format!("{prefix}-{timestamp}")
    }
}
