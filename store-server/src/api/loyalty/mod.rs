//! Loyalty API 模块

mod handler;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth::middleware::require_auth;
use crate::core::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    let routes = Router::new()
        .route("/balance", get(handler::balance))
        .route("/history", get(handler::history))
        .route("/redeem", post(handler::redeem))
        .layer(middleware::from_fn_with_state(state, require_auth));

    Router::new().nest("/api/loyalty", routes)
}
