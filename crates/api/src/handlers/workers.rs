use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use nodepool_core::models::{NodeHeartbeat, NodeRegistration};
use serde::Deserialize;
use tracing::debug;

use crate::{
    error::ApiResult,
    response::{created, success},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct PollParams {
    pub wait_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkRequest {
    pub chunk: String,
}

#[derive(Debug, Deserialize)]
pub struct FailureRequest {
    pub reason: String,
}

/// 注册节点
pub async fn register_node(
    State(state): State<AppState>,
    Json(registration): Json<NodeRegistration>,
) -> ApiResult<impl IntoResponse> {
    let node = state.pool.registry.register(registration).await?;
    Ok(created(node))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(heartbeat): Json<NodeHeartbeat>,
) -> ApiResult<impl IntoResponse> {
    let node = state.pool.registry.heartbeat(&id, heartbeat).await?;
    Ok(success(node))
}

/// 长轮询节点指令，等待时长不超过配置上限
pub async fn poll_commands(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PollParams>,
) -> ApiResult<impl IntoResponse> {
    state.pool.registry.get(&id).await?;
    let limit = state.config.long_poll();
    let wait = params
        .wait_seconds
        .map(Duration::from_secs)
        .map_or(limit, |wait| wait.min(limit));
    let commands = state.mailbox.poll(&id, wait).await;
    debug!("节点 {} 取走 {} 条指令", id, commands.len());
    Ok(success(commands))
}

/// 节点下载任务压缩包
pub async fn fetch_archive(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state.pool.coordinator.fetch_payload(&id, &task_id).await?;
    Ok(([(header::CONTENT_TYPE, "application/zip")], bytes))
}

pub async fn acknowledge_execute(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .pool
        .coordinator
        .acknowledge_execute(&id, &task_id)
        .await?;
    Ok(success(task))
}

pub async fn report_running(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(String, String)>,
    Json(heartbeat): Json<NodeHeartbeat>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .pool
        .coordinator
        .report_running(&id, &task_id, heartbeat)
        .await?;
    Ok(success(task.status))
}

pub async fn report_output(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(String, String)>,
    Json(request): Json<ChunkRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .pool
        .coordinator
        .report_output(&id, &task_id, &request.chunk)
        .await?;
    Ok(success(task_id))
}

pub async fn report_logs(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(String, String)>,
    Json(request): Json<ChunkRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .pool
        .coordinator
        .report_logs(&id, &task_id, &request.chunk)
        .await?;
    Ok(success(task_id))
}

/// 上报完成，请求体为结果压缩包
pub async fn report_completion(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .pool
        .coordinator
        .report_completion(&id, &task_id, body.to_vec())
        .await?;
    Ok(success(task))
}

pub async fn report_failure(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(String, String)>,
    Json(request): Json<FailureRequest>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .pool
        .coordinator
        .report_failure(&id, &task_id, &request.reason)
        .await?;
    Ok(success(task))
}

pub async fn acknowledge_stop(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let task = state.pool.coordinator.acknowledge_stop(&id, &task_id).await?;
    Ok(success(task))
}
