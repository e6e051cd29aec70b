//! User API Handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::auth::CurrentUser;
use crate::core::AppState;
use crate::db::repository::user;
use crate::utils::{AppError, AppResult};
use shared::models::{User, UserPublic, UserUpdate};

/// GET /api/users/me - 当前用户
pub async fn me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<UserPublic>> {
    let account = user::find_by_id(&state.pool, current.id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("User {}", current.id)))?;
    Ok(Json(account.into()))
}

/// GET /api/users - 全部用户 (admin)
pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(user::find_all(&state.pool).await?))
}

/// GET /api/users/:id (admin)
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<User>> {
    user::find_by_id(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("User {id}")))
}

/// PUT /api/users/:id (admin)
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UserUpdate>,
) -> AppResult<Json<User>> {
    Ok(Json(user::update(&state.pool, id, payload).await?))
}

/// DELETE /api/users/:id - 软删除 (admin)
pub async fn delete(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<bool>> {
    Ok(Json(user::soft_delete(&state.pool, id).await?))
}
