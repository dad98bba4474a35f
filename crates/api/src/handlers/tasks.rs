use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use nodepool_core::models::{ResourceSpec, TaskFilter, TaskId, TaskSubmission};
use nodepool_core::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiResult,
    response::{created, success, success_with_message},
    routes::AppState,
};

/// 任务提交参数，压缩包作为请求体原样上传
#[derive(Debug, Deserialize)]
pub struct SubmitTaskParams {
    pub owner_id: String,
    pub task_id: Option<String>,
    pub memory_gb: Option<f64>,
    pub cpu_score: Option<f64>,
    pub gpu_score: Option<f64>,
    pub gpu_memory_gb: Option<f64>,
    pub gpu_name: Option<String>,
    pub location: Option<String>,
}

impl SubmitTaskParams {
    /// 四项数值需求必须全部给出，缺失时在任何状态变更之前拒绝
    fn into_submission(self, archive: Vec<u8>) -> SchedulerResult<TaskSubmission> {
        let (Some(memory_gb), Some(cpu_score), Some(gpu_score), Some(gpu_memory_gb)) =
            (self.memory_gb, self.cpu_score, self.gpu_score, self.gpu_memory_gb)
        else {
            let missing: Vec<&str> = [
                ("memory_gb", self.memory_gb),
                ("cpu_score", self.cpu_score),
                ("gpu_score", self.gpu_score),
                ("gpu_memory_gb", self.gpu_memory_gb),
            ]
            .into_iter()
            .filter_map(|(name, value)| value.is_none().then_some(name))
            .collect();
            return Err(SchedulerError::invalid_requirements(format!(
                "缺少资源需求字段: {}",
                missing.join(", ")
            )));
        };

        Ok(TaskSubmission {
            task_id: self.task_id,
            owner_id: self.owner_id,
            requirements: ResourceSpec {
                memory_gb,
                cpu_score,
                gpu_score,
                gpu_memory_gb,
                gpu_name: self.gpu_name,
                location: self.location,
            },
            archive,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct TextSnapshot {
    pub task_id: TaskId,
    pub content: String,
}

/// 提交任务
pub async fn submit_task(
    State(state): State<AppState>,
    Query(params): Query<SubmitTaskParams>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let submission = params.into_submission(body.to_vec())?;
    let task = state.pool.task_store.submit(submission).await?;
    Ok(created(task))
}

/// 获取任务列表，支持按状态和用户过滤
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(filter): Query<TaskFilter>,
) -> ApiResult<impl IntoResponse> {
    let tasks = state.pool.task_store.list_all(&filter).await?;
    Ok(success(tasks))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let task = state.pool.task_store.get_status(&id).await?;
    Ok(success(task))
}

/// 下载任务结果压缩包
pub async fn get_task_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state.pool.task_store.get_result(&id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{id}-result.zip\""),
            ),
        ],
        bytes,
    ))
}

pub async fn get_task_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let content = state.pool.task_store.get_logs(&id).await?;
    Ok(success(TextSnapshot {
        task_id: id,
        content,
    }))
}

pub async fn get_task_output(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let content = state.pool.task_store.get_output(&id).await?;
    Ok(success(TextSnapshot {
        task_id: id,
        content,
    }))
}

/// 停止任务
pub async fn stop_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let task = state.pool.coordinator.request_stop(&id).await?;
    let message = if task.status.is_terminal() {
        "任务已停止"
    } else {
        "已通知节点停止任务, 等待确认"
    };
    Ok(success_with_message(task, message))
}

/// 删除已结束的任务及其文件
pub async fn cleanup_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.pool.task_store.cleanup(&id).await?;
    Ok(success_with_message(id, "任务已清理"))
}
