//! Payment API 模块

mod handler;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth::middleware::{require_admin, require_auth};
use crate::core::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    // 回调是网关发起的，靠 HMAC 签名鉴权而非登录态
    let webhook = Router::new().route("/webhook", post(handler::webhook));

    let admin = Router::new()
        .route("/methods", post(handler::create_method))
        .layer(middleware::from_fn(require_admin));

    let session = Router::new()
        .route("/methods", get(handler::methods))
        .route("/checkout/{order_id}", post(handler::checkout))
        .route("/{code}", get(handler::query))
        .route("/{code}/refresh", post(handler::refresh))
        .merge(admin)
        .layer(middleware::from_fn_with_state(state, require_auth));

    Router::new().nest("/api/payments", webhook.merge(session))
}
