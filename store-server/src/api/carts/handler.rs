//! Cart API Handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::core::AppState;
use crate::db::repository::cart;
use crate::utils::{AppError, AppResult};
use shared::models::{Cart, CartItem, CartItemCreate, Order, OrderLine};

/// Cart with its lines.
#[derive(Serialize)]
pub struct CartView {
    #[serde(flatten)]
    pub cart: Cart,
    pub items: Vec<CartItem>,
}

/// GET /api/cart - 当前用户的购物车
pub async fn get_cart(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<CartView>> {
    let cart = cart::get_or_create_open(&state.pool, current.id).await?;
    let items = cart::items(&state.pool, cart.id).await?;
    Ok(Json(CartView { cart, items }))
}

/// POST /api/cart/items - 加入商品（同款合并数量）
pub async fn add_item(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<CartItemCreate>,
) -> AppResult<Json<CartView>> {
    if payload.quantity <= 0 {
        return Err(AppError::Validation("quantity must be positive".into()));
    }
    let cart = cart::get_or_create_open(&state.pool, current.id).await?;
    cart::upsert_item(
        &state.pool,
        cart.id,
        payload.variant_id,
        payload.warehouse_id,
        payload.quantity,
    )
    .await?;
    let items = cart::items(&state.pool, cart.id).await?;
    Ok(Json(CartView { cart, items }))
}

#[derive(Deserialize)]
pub struct QuantityUpdate {
    pub quantity: i64,
}

/// PUT /api/cart/items/:id - 修改数量
pub async fn set_quantity(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(item_id): Path<i64>,
    Json(payload): Json<QuantityUpdate>,
) -> AppResult<Json<CartView>> {
    if payload.quantity <= 0 {
        return Err(AppError::Validation("quantity must be positive".into()));
    }
    let cart = cart::get_or_create_open(&state.pool, current.id).await?;
    if !cart::set_item_quantity(&state.pool, cart.id, item_id, payload.quantity).await? {
        return Err(AppError::not_found(format!("Cart item {item_id}")));
    }
    let items = cart::items(&state.pool, cart.id).await?;
    Ok(Json(CartView { cart, items }))
}

/// DELETE /api/cart/items/:id
pub async fn remove_item(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(item_id): Path<i64>,
) -> AppResult<Json<CartView>> {
    let cart = cart::get_or_create_open(&state.pool, current.id).await?;
    cart::remove_item(&state.pool, cart.id, item_id).await?;
    let items = cart::items(&state.pool, cart.id).await?;
    Ok(Json(CartView { cart, items }))
}

/// DELETE /api/cart - 清空
pub async fn clear(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<CartView>> {
    let cart = cart::get_or_create_open(&state.pool, current.id).await?;
    cart::clear(&state.pool, cart.id).await?;
    Ok(Json(CartView { cart, items: vec![] }))
}

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub payment_method_id: Option<i64>,
    pub note: Option<String>,
}

/// POST /api/cart/checkout - 购物车转订单
pub async fn checkout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<Order>> {
    let cart = cart::get_or_create_open(&state.pool, current.id).await?;
    let items = cart::items(&state.pool, cart.id).await?;
    if items.is_empty() {
        return Err(AppError::Validation("cart is empty".into()));
    }

    let lines: Vec<OrderLine> = items
        .iter()
        .map(|i| OrderLine {
            variant_id: i.variant_id,
            warehouse_id: i.warehouse_id,
            quantity: i.quantity,
        })
        .collect();

    let order = state
        .lifecycle
        .place_order(current.id, &lines, payload.payment_method_id, payload.note)
        .await?;

    // The reservation is committed with the order; closing the cart is
    // best-effort bookkeeping.
    let mut conn = state
        .pool
        .acquire()
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    if let Err(e) = cart::close(&mut conn, cart.id).await {
        tracing::warn!(cart_id = cart.id, error = %e, "failed to close cart after checkout");
    }

    Ok(Json(order))
}
