//! Loyalty API Handlers

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::core::AppState;
use crate::utils::AppResult;
use shared::models::PointTransaction;

#[derive(Serialize)]
pub struct BalanceView {
    pub points_balance: i64,
}

/// GET /api/loyalty/balance
pub async fn balance(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<BalanceView>> {
    let points_balance = state.loyalty.balance(current.id).await?;
    Ok(Json(BalanceView { points_balance }))
}

/// GET /api/loyalty/history - 积分流水
pub async fn history(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<Vec<PointTransaction>>> {
    Ok(Json(state.loyalty.history(current.id).await?))
}

#[derive(Deserialize)]
pub struct RedeemRequest {
    pub points: i64,
    pub note: Option<String>,
}

/// POST /api/loyalty/redeem - 扣减积分
pub async fn redeem(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<RedeemRequest>,
) -> AppResult<Json<PointTransaction>> {
    let entry = state
        .loyalty
        .redeem(current.id, payload.points, payload.note.as_deref())
        .await?;
    Ok(Json(entry))
}
