//! Inventory API Handlers

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::core::AppState;
use crate::db::repository::{stock, warehouse};
use crate::utils::{AppError, AppResult};
use shared::models::{InventoryTransaction, StockAlert, VariantStock, Warehouse, WarehouseCreate};

/// GET /api/inventory/warehouses
pub async fn list_warehouses(State(state): State<AppState>) -> AppResult<Json<Vec<Warehouse>>> {
    Ok(Json(warehouse::find_all(&state.pool).await?))
}

/// POST /api/inventory/warehouses
pub async fn create_warehouse(
    State(state): State<AppState>,
    Json(payload): Json<WarehouseCreate>,
) -> AppResult<Json<Warehouse>> {
    Ok(Json(warehouse::create(&state.pool, payload).await?))
}

/// GET /api/inventory/warehouses/:id
pub async fn get_warehouse(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Warehouse>> {
    warehouse::find_by_id(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Warehouse {id}")))
}

/// DELETE /api/inventory/warehouses/:id
pub async fn delete_warehouse(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<bool>> {
    Ok(Json(warehouse::soft_delete(&state.pool, id).await?))
}

/// GET /api/inventory/stock/:variant_id - 各仓库存
pub async fn stock_by_variant(
    State(state): State<AppState>,
    Path(variant_id): Path<i64>,
) -> AppResult<Json<Vec<VariantStock>>> {
    Ok(Json(stock::list_by_variant(&state.pool, variant_id).await?))
}

/// GET /api/inventory/transactions/:variant_id - 库存流水
pub async fn transactions_by_variant(
    State(state): State<AppState>,
    Path(variant_id): Path<i64>,
) -> AppResult<Json<Vec<InventoryTransaction>>> {
    Ok(Json(stock::list_inventory_tx(&state.pool, variant_id).await?))
}

#[derive(Deserialize)]
pub struct AdjustRequest {
    pub variant_id: i64,
    pub warehouse_id: i64,
    pub delta: i64,
    pub reason: String,
}

/// POST /api/inventory/adjust - 盘点/损耗/进货
pub async fn adjust(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<AdjustRequest>,
) -> AppResult<Json<VariantStock>> {
    let stock = state
        .stock
        .adjust(
            payload.variant_id,
            payload.warehouse_id,
            payload.delta,
            &payload.reason,
            current.id,
        )
        .await?;
    Ok(Json(stock))
}

#[derive(Deserialize)]
pub struct TransferRequest {
    pub variant_id: i64,
    pub from_warehouse: i64,
    pub to_warehouse: i64,
    pub quantity: i64,
}

/// POST /api/inventory/transfer - 仓库调拨
pub async fn transfer(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<TransferRequest>,
) -> AppResult<Json<bool>> {
    state
        .stock
        .transfer(
            payload.from_warehouse,
            payload.to_warehouse,
            payload.variant_id,
            payload.quantity,
            current.id,
        )
        .await?;
    Ok(Json(true))
}

#[derive(Deserialize)]
pub struct AlertQuery {
    pub status: Option<String>,
}

/// GET /api/inventory/alerts?status=open
pub async fn alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> AppResult<Json<Vec<StockAlert>>> {
    Ok(Json(state.stock.alerts(query.status.as_deref()).await?))
}

/// POST /api/inventory/alerts/:id/resolve
pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<bool>> {
    Ok(Json(state.stock.resolve_alert(id).await?))
}
