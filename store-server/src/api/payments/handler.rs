//! Payment API Handlers

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::auth::CurrentUser;
use crate::core::AppState;
use crate::db::repository::payment;
use crate::payment::CheckoutSession;
use crate::utils::{AppError, AppResult};
use shared::models::{Order, PaymentMethod, PaymentMethodCreate, PaymentTransaction};

/// GET /api/payments/methods - 可用支付方式
pub async fn methods(State(state): State<AppState>) -> AppResult<Json<Vec<PaymentMethod>>> {
    Ok(Json(payment::find_methods(&state.pool).await?))
}

/// POST /api/payments/methods - 新增支付方式 (admin)
pub async fn create_method(
    State(state): State<AppState>,
    Json(payload): Json<PaymentMethodCreate>,
) -> AppResult<Json<PaymentMethod>> {
    Ok(Json(payment::create_method(&state.pool, payload).await?))
}

/// POST /api/payments/checkout/:order_id - 创建支付意图
pub async fn checkout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(order_id): Path<i64>,
) -> AppResult<Json<CheckoutSession>> {
    let order = state.lifecycle.get(order_id).await?;
    if order.user_id != current.id && !current.is_admin() {
        return Err(AppError::Forbidden("not your order".into()));
    }
    Ok(Json(state.payments.start_checkout(order_id).await?))
}

/// POST /api/payments/webhook - 网关回调
///
/// Body 是平铺的字段表；`signature` 字段剥离后参与验签。
pub async fn webhook(
    State(state): State<AppState>,
    Json(mut fields): Json<BTreeMap<String, String>>,
) -> AppResult<Json<Order>> {
    let signature = fields
        .remove("signature")
        .ok_or_else(|| AppError::Validation("webhook missing signature".into()))?;
    let order = state.payments.handle_webhook(fields, &signature).await?;
    Ok(Json(order))
}

/// GET /api/payments/:code - 本地交易状态
pub async fn query(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(code): Path<String>,
) -> AppResult<Json<PaymentTransaction>> {
    let tx = state.payments.find_transaction(&code).await?;
    ensure_owner(&state, &current, tx.order_id).await?;
    Ok(Json(tx))
}

/// POST /api/payments/:code/refresh - 主动向网关查询（幂等读，可重试）
pub async fn refresh(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(code): Path<String>,
) -> AppResult<Json<PaymentTransaction>> {
    let tx = state.payments.find_transaction(&code).await?;
    ensure_owner(&state, &current, tx.order_id).await?;
    Ok(Json(state.payments.refresh_status(&code).await?))
}

async fn ensure_owner(state: &AppState, current: &CurrentUser, order_id: i64) -> AppResult<()> {
    let order = state.lifecycle.get(order_id).await?;
    if order.user_id != current.id && !current.is_admin() {
        return Err(AppError::Forbidden("not your order".into()));
    }
    Ok(())
}
