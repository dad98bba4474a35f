use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use nodepool_core::SchedulerError;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::ApiResult,
    response::{success, success_with_message},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: u64,
}

/// 账户余额视图，`available` 为扣除任务预留后可转出的部分
#[derive(Debug, Serialize)]
pub struct BalanceView {
    pub owner_id: String,
    pub balance: u64,
    pub reserved: u64,
    pub available: u64,
}

async fn balance_view(state: &AppState, owner_id: &str) -> ApiResult<BalanceView> {
    let account = state.credits.account(owner_id).await?;
    Ok(BalanceView {
        owner_id: owner_id.to_string(),
        balance: account.balance,
        reserved: account.reserved,
        available: account.available(),
    })
}

pub async fn get_balance(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(balance_view(&state, &owner_id).await?))
}

/// 用户间转账，只能转出未被任务预留的积分
pub async fn transfer_credits(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .credits
        .transfer(&request.from, &request.to, request.amount)
        .await?;
    let view = balance_view(&state, &request.from).await?;
    Ok(success_with_message(
        view,
        format!("已向 {} 转账 {}", request.to, request.amount),
    ))
}

pub async fn deposit_credits(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Json(request): Json<DepositRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.amount == 0 {
        return Err(SchedulerError::invalid_input("充值金额必须大于零").into());
    }
    state.credits.deposit(&owner_id, request.amount).await?;
    info!("管理接口为用户 {} 充值 {}", owner_id, request.amount);
    Ok(success(balance_view(&state, &owner_id).await?))
}
