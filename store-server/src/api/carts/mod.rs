//! Cart API 模块

mod handler;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::auth::middleware::require_auth;
use crate::core::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    let routes = Router::new()
        .route("/", get(handler::get_cart).delete(handler::clear))
        .route("/items", post(handler::add_item))
        .route("/items/{id}", put(handler::set_quantity).delete(handler::remove_item))
        .route("/checkout", post(handler::checkout))
        .layer(middleware::from_fn_with_state(state, require_auth));

    Router::new().nest("/api/cart", routes)
}
