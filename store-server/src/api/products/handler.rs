//! Product API Handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::core::AppState;
use crate::db::repository::product;
use crate::utils::{AppError, AppResult};
use shared::models::{
    Product, ProductCreate, ProductUpdate, ProductVariant, ProductVariantCreate,
    ProductVariantUpdate,
};

#[derive(serde::Deserialize)]
pub struct ListQuery {
    pub category_id: Option<i64>,
}

/// GET /api/products?category_id=x
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Product>>> {
    let products = match query.category_id {
        Some(category_id) => product::find_by_category(&state.pool, category_id).await?,
        None => product::find_all(&state.pool).await?,
    };
    Ok(Json(products))
}

/// GET /api/products/:id
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Product>> {
    product::find_by_id(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Product {id}")))
}

/// GET /api/products/:id/variants
pub async fn variants(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<ProductVariant>>> {
    Ok(Json(product::find_variants_by_product(&state.pool, id).await?))
}

/// POST /api/products
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<ProductCreate>,
) -> AppResult<Json<Product>> {
    Ok(Json(product::create(&state.pool, payload).await?))
}

/// PUT /api/products/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ProductUpdate>,
) -> AppResult<Json<Product>> {
    Ok(Json(product::update(&state.pool, id, payload).await?))
}

/// DELETE /api/products/:id
pub async fn delete(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<bool>> {
    Ok(Json(product::soft_delete(&state.pool, id).await?))
}

/// POST /api/products/variants
pub async fn create_variant(
    State(state): State<AppState>,
    Json(payload): Json<ProductVariantCreate>,
) -> AppResult<Json<ProductVariant>> {
    Ok(Json(product::create_variant(&state.pool, payload).await?))
}

/// PUT /api/products/variants/:id
pub async fn update_variant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ProductVariantUpdate>,
) -> AppResult<Json<ProductVariant>> {
    Ok(Json(product::update_variant(&state.pool, id, payload).await?))
}
