//! Order API Handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::core::AppState;
use crate::db::repository::order;
use crate::utils::{AppError, AppResult};
use shared::models::{Order, OrderItem, OrderLine, OrderStatus, OrderStatusHistory};

#[derive(Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub lines: Vec<OrderLine>,
    pub payment_method_id: Option<i64>,
    pub note: Option<String>,
}

/// POST /api/orders - 直接下单
pub async fn place(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<PlaceOrderRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .lifecycle
        .place_order(
            current.id,
            &payload.lines,
            payload.payment_method_id,
            payload.note,
        )
        .await?;
    Ok(Json(order))
}

/// GET /api/orders - 当前用户的订单
pub async fn list_mine(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(order::list_by_user(&state.pool, current.id).await?))
}

/// GET /api/orders/all - 全量订单 (admin)
pub async fn list_all(State(state): State<AppState>) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(order::list_all(&state.pool, 200).await?))
}

/// GET /api/orders/:id - 订单详情（本人或 admin）
pub async fn get_by_id(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<OrderDetail>> {
    let order = load_owned(&state, &current, id).await?;
    let items = order::items_by_order(&state.pool, id).await?;
    Ok(Json(OrderDetail { order, items }))
}

/// GET /api/orders/:id/history - 状态历史（本人或 admin）
pub async fn history(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<OrderStatusHistory>>> {
    load_owned(&state, &current, id).await?;
    Ok(Json(order::history_by_order(&state.pool, id).await?))
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// POST /api/orders/:id/cancel - 取消（发货前）
pub async fn cancel(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<CancelRequest>,
) -> AppResult<Json<Order>> {
    load_owned(&state, &current, id).await?;
    let order = state
        .lifecycle
        .transition(
            id,
            OrderStatus::Cancelled,
            current.id,
            payload.reason.as_deref(),
        )
        .await?;
    Ok(Json(order))
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: OrderStatus,
    pub comment: Option<String>,
}

/// POST /api/orders/:id/transition - 推进状态 (admin)
pub async fn transition(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<TransitionRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .lifecycle
        .transition(id, payload.status, current.id, payload.comment.as_deref())
        .await?;
    Ok(Json(order))
}

/// Owner-or-admin access check.
async fn load_owned(state: &AppState, current: &CurrentUser, order_id: i64) -> AppResult<Order> {
    let order = order::find_by_id(&state.pool, order_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Order {order_id}")))?;
    if order.user_id != current.id && !current.is_admin() {
        return Err(AppError::Forbidden("not your order".into()));
    }
    Ok(order)
}
