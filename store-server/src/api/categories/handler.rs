//! Category API Handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::core::AppState;
use crate::db::repository::category;
use crate::utils::{AppError, AppResult};
use shared::models::{Category, CategoryCreate, CategoryNode, CategoryUpdate};

/// GET /api/categories - 扁平列表
pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(category::find_all(&state.pool).await?))
}

/// GET /api/categories/tree - 树形视图
pub async fn tree(State(state): State<AppState>) -> AppResult<Json<Vec<CategoryNode>>> {
    let flat = category::find_all(&state.pool).await?;
    Ok(Json(CategoryNode::build_tree(flat)))
}

/// GET /api/categories/:id
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Category>> {
    category::find_by_id(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Category {id}")))
}

/// GET /api/categories/:id/children
pub async fn children(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(category::find_children(&state.pool, id).await?))
}

/// POST /api/categories - 创建
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CategoryCreate>,
) -> AppResult<Json<Category>> {
    Ok(Json(category::create(&state.pool, payload).await?))
}

/// PUT /api/categories/:id - 更新
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<CategoryUpdate>,
) -> AppResult<Json<Category>> {
    Ok(Json(category::update(&state.pool, id, payload).await?))
}

/// DELETE /api/categories/:id - 软删除
pub async fn delete(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<bool>> {
    Ok(Json(category::soft_delete(&state.pool, id).await?))
}
