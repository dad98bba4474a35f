use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use nodepool_core::models::NodeFilter;

use crate::{error::ApiResult, response::success, routes::AppState};

/// 获取节点列表，按node_id排序
pub async fn list_nodes(
    State(state): State<AppState>,
    Query(filter): Query<NodeFilter>,
) -> ApiResult<impl IntoResponse> {
    let nodes = state.pool.registry.list_nodes(&filter).await?;
    Ok(success(nodes))
}

pub async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let node = state.pool.registry.get(&id).await?;
    Ok(success(node))
}

/// 集群健康概览
pub async fn cluster_health(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let health = state.pool.stats.snapshot().await?;
    Ok(success(health))
}
