//! Category API 模块

mod handler;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::auth::middleware::{require_admin, require_auth};
use crate::core::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    // 读取路由：店面浏览，无需登录
    let read_routes = Router::new()
        .route("/", get(handler::list))
        .route("/tree", get(handler::tree))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/children", get(handler::children));

    // 管理路由：admin
    let manage_routes = Router::new()
        .route("/", post(handler::create))
        .route("/{id}", put(handler::update).delete(handler::delete))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state, require_auth));

    Router::new().nest("/api/categories", read_routes.merge(manage_routes))
}
