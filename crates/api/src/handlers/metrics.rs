use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
};

use crate::{error::ApiError, error::ApiResult, routes::AppState};

/// Prometheus文本格式的指标
pub async fn render_metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let handle = state.metrics.as_ref().ok_or(ApiError::NotFound)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    ))
}
