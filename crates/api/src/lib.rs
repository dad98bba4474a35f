//! # NodePool API
//!
//! 节点池主控的HTTP接口，基于Axum构建。
//!
//! ## 客户端接口
//!
//! - `POST /api/tasks?owner_id=..&gpu_score=..` - 提交任务，请求体为任务压缩包
//! - `GET /api/tasks` - 任务列表，支持 `status` / `owner_id` 过滤
//! - `GET /api/tasks/{id}` - 任务状态
//! - `GET /api/tasks/{id}/result` - 下载结果压缩包
//! - `GET /api/tasks/{id}/logs`、`GET /api/tasks/{id}/output` - 日志和输出
//! - `POST /api/tasks/{id}/stop` - 停止任务
//! - `POST /api/tasks/{id}/cleanup` - 删除已结束的任务
//! - `GET /api/nodes`、`GET /api/nodes/{id}` - 节点查询
//! - `GET /api/cluster/health` - 集群健康概览
//! - `GET /api/credits/{owner_id}` - 积分余额（含任务预留）
//! - `POST /api/credits/transfer` - 用户间转账，请求体 `{"from", "to", "amount"}`
//! - `POST /api/credits/{owner_id}/deposit` - 充值，请求体 `{"amount"}`
//!
//! ## 工作节点接口
//!
//! - `POST /api/nodes/register` - 注册节点
//! - `POST /api/nodes/{id}/heartbeat` - 心跳
//! - `GET /api/nodes/{id}/commands?wait_seconds=25` - 长轮询执行/停止指令
//! - `GET /api/nodes/{id}/tasks/{task_id}/archive` - 下载任务压缩包
//! - `POST /api/nodes/{id}/tasks/{task_id}/{ack,running,output,logs,complete,fail,stop-ack}`
//!
//! ## 响应格式
//!
//! ```json
//! {
//!   "success": true,
//!   "data": { "id": "task-1", "status": "PENDING" },
//!   "message": null,
//!   "timestamp": "2024-01-01T00:00:00Z"
//! }
//! ```
//!
//! 错误响应带有 `error.type`（如 `UNKNOWN_TASK`、`INVALID_STATE`）和对应的HTTP状态码。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use nodepool_core::config::ObservabilityConfig;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, observability: &ObservabilityConfig) -> Router {
    let cors = state
        .config
        .cors_enabled
        .then(|| cors_layer(&state.config.cors_origins));

    let router = create_routes(state, &observability.metrics_endpoint).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    );

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}
