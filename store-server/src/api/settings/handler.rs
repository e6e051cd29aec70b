//! Settings API Handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::core::AppState;
use crate::utils::{AppError, AppResult};
use shared::models::{Setting, SettingValue};

/// GET /api/settings - 全部设置
pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<Setting>>> {
    Ok(Json(state.settings.all().await?))
}

/// GET /api/settings/:key - 单个设置（带类型）
pub async fn get_by_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<Json<SettingValue>> {
    state
        .settings
        .get(&key)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Setting {key}")))
}

/// PUT /api/settings/:key - 写入带类型的值
pub async fn set(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(value): Json<SettingValue>,
) -> AppResult<Json<SettingValue>> {
    state.settings.set(&key, value.clone()).await?;
    Ok(Json(value))
}
