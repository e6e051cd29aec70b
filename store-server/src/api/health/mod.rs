//! Health check endpoint

use axum::{routing::get, Json, Router};

use crate::core::AppState;
use crate::utils::{ok, AppResponse};

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}

async fn health() -> Json<AppResponse<serde_json::Value>> {
    ok(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "time": shared::util::now_millis(),
    }))
}
