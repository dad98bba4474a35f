use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use nodepool_core::config::ApiConfig;
use nodepool_dispatcher::NodePool;
use nodepool_infrastructure::{InMemoryCreditLedger, MailboxNotifier};

use crate::handlers::{
    credits::{deposit_credits, get_balance, transfer_credits},
    health::health_check,
    metrics::render_metrics,
    nodes::{cluster_health, get_node, list_nodes},
    tasks::{
        cleanup_task, get_task, get_task_logs, get_task_output, get_task_result, list_tasks,
        stop_task, submit_task,
    },
    workers::{
        acknowledge_execute, acknowledge_stop, fetch_archive, heartbeat, poll_commands,
        register_node, report_completion, report_failure, report_logs, report_output,
        report_running,
    },
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<NodePool>,
    /// 节点长轮询读取的指令信箱，与节点池使用的通知器是同一个实例
    pub mailbox: Arc<MailboxNotifier>,
    /// 积分账本，与节点池的积分网关是同一个实例
    pub credits: Arc<InMemoryCreditLedger>,
    pub config: ApiConfig,
    pub metrics: Option<PrometheusHandle>,
}

/// 创建API路由
pub fn create_routes(state: AppState, metrics_endpoint: &str) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.config.max_archive_bytes());

    let mut router = Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 客户端任务API
        .route(
            "/api/tasks",
            get(list_tasks).post(submit_task).layer(upload_limit.clone()),
        )
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/tasks/{id}/result", get(get_task_result))
        .route("/api/tasks/{id}/logs", get(get_task_logs))
        .route("/api/tasks/{id}/output", get(get_task_output))
        .route("/api/tasks/{id}/stop", post(stop_task))
        .route("/api/tasks/{id}/cleanup", post(cleanup_task))
        // 积分API
        .route("/api/credits/transfer", post(transfer_credits))
        .route("/api/credits/{owner_id}", get(get_balance))
        .route("/api/credits/{owner_id}/deposit", post(deposit_credits))
        // 节点查询API
        .route("/api/nodes", get(list_nodes))
        .route("/api/nodes/{id}", get(get_node))
        .route("/api/cluster/health", get(cluster_health))
        // 工作节点协议
        .route("/api/nodes/register", post(register_node))
        .route("/api/nodes/{id}/heartbeat", post(heartbeat))
        .route("/api/nodes/{id}/commands", get(poll_commands))
        .route(
            "/api/nodes/{id}/tasks/{task_id}/archive",
            get(fetch_archive),
        )
        .route(
            "/api/nodes/{id}/tasks/{task_id}/ack",
            post(acknowledge_execute),
        )
        .route(
            "/api/nodes/{id}/tasks/{task_id}/running",
            post(report_running),
        )
        .route("/api/nodes/{id}/tasks/{task_id}/output", post(report_output))
        .route("/api/nodes/{id}/tasks/{task_id}/logs", post(report_logs))
        .route(
            "/api/nodes/{id}/tasks/{task_id}/complete",
            post(report_completion).layer(upload_limit),
        )
        .route("/api/nodes/{id}/tasks/{task_id}/fail", post(report_failure))
        .route(
            "/api/nodes/{id}/tasks/{task_id}/stop-ack",
            post(acknowledge_stop),
        );

    if state.metrics.is_some() {
        router = router.route(metrics_endpoint, get(render_metrics));
    }

    router.with_state(state)
}
