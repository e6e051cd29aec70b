//! Order API 模块

mod handler;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth::middleware::{require_admin, require_auth};
use crate::core::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    // 用户路由：自己的订单
    let user_routes = Router::new()
        .route("/", get(handler::list_mine).post(handler::place))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/history", get(handler::history))
        .route("/{id}/cancel", post(handler::cancel));

    // 管理路由：状态推进与全量列表
    let admin_routes = Router::new()
        .route("/all", get(handler::list_all))
        .route("/{id}/transition", post(handler::transition))
        .layer(middleware::from_fn(require_admin));

    Router::new().nest(
        "/api/orders",
        user_routes
            .merge(admin_routes)
            .layer(middleware::from_fn_with_state(state, require_auth)),
    )
}
