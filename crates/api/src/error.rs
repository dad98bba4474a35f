use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nodepool_core::SchedulerError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源")]
    NotFound,

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Scheduler(err) => match err {
                SchedulerError::UnknownTask { .. } => (StatusCode::NOT_FOUND, "UNKNOWN_TASK"),
                SchedulerError::UnknownNode { .. } => (StatusCode::NOT_FOUND, "UNKNOWN_NODE"),
                SchedulerError::InvalidState { .. } => (StatusCode::CONFLICT, "INVALID_STATE"),
                SchedulerError::InvalidRequirements(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_REQUIREMENTS")
                }
                SchedulerError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                SchedulerError::Serialization(_) => {
                    (StatusCode::BAD_REQUEST, "SERIALIZATION_ERROR")
                }
                SchedulerError::Unauthorized { .. }
                | SchedulerError::InsufficientBalance { .. } => {
                    (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_CREDITS")
                }
                SchedulerError::DuplicateNode { .. } => (StatusCode::CONFLICT, "DUPLICATE_NODE"),
                SchedulerError::DuplicateTask { .. } => (StatusCode::CONFLICT, "DUPLICATE_TASK"),
                SchedulerError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
                SchedulerError::Storage(_)
                | SchedulerError::CreditGate(_)
                | SchedulerError::Notification { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "DEPENDENCY_UNAVAILABLE")
                }
                SchedulerError::Configuration(_) | SchedulerError::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        let (message, hint) = match &self {
            ApiError::Scheduler(err) => (err.to_string(), err.user_message().to_string()),
            ApiError::BadRequest(msg) => (msg.clone(), "请检查请求格式和参数".to_string()),
            ApiError::NotFound => (
                "请求的资源不存在".to_string(),
                "请检查请求URL是否正确".to_string(),
            ),
            ApiError::Internal(msg) => (msg.clone(), "系统遇到内部错误，请稍后重试".to_string()),
        };

        if status.is_server_error() {
            error!("请求处理失败: {}", self);
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "message": message,
                "hint": hint,
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
