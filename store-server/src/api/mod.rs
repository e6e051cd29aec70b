//! HTTP API
//!
//! 每个资源一个子模块（router + handler），在这里统一拼装。
//! 处理函数保持薄：取参 → 调服务/仓储 → 返回 JSON。

mod auth;
mod carts;
mod categories;
mod health;
mod inventory;
mod loyalty;
mod orders;
mod payments;
mod products;
mod settings;
mod users;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::core::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(auth::router(state.clone()))
        .merge(categories::router(state.clone()))
        .merge(products::router(state.clone()))
        .merge(users::router(state.clone()))
        .merge(inventory::router(state.clone()))
        .merge(carts::router(state.clone()))
        .merge(orders::router(state.clone()))
        .merge(payments::router(state.clone()))
        .merge(loyalty::router(state.clone()))
        .merge(settings::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
