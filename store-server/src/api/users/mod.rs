//! User API 模块

mod handler;

use axum::{middleware, routing::get, Router};

use crate::auth::middleware::{require_admin, require_auth};
use crate::core::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    let me_routes = Router::new().route("/me", get(handler::me));

    let admin_routes = Router::new()
        .route("/", get(handler::list))
        .route(
            "/{id}",
            get(handler::get_by_id)
                .put(handler::update)
                .delete(handler::delete),
        )
        .layer(middleware::from_fn(require_admin));

    Router::new().nest(
        "/api/users",
        me_routes
            .merge(admin_routes)
            .layer(middleware::from_fn_with_state(state, require_auth)),
    )
}
