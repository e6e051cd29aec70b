//! Product API 模块

mod handler;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::auth::middleware::{require_admin, require_auth};
use crate::core::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    let read_routes = Router::new()
        .route("/", get(handler::list))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/variants", get(handler::variants));

    let manage_routes = Router::new()
        .route("/", post(handler::create))
        .route("/{id}", put(handler::update).delete(handler::delete))
        .route("/variants", post(handler::create_variant))
        .route("/variants/{id}", put(handler::update_variant))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state, require_auth));

    Router::new().nest("/api/products", read_routes.merge(manage_routes))
}
