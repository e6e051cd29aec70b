//! Settings API 模块 (admin)

mod handler;

use axum::{middleware, routing::get, Router};

use crate::auth::middleware::{require_admin, require_auth};
use crate::core::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    let routes = Router::new()
        .route("/", get(handler::list))
        .route("/{key}", get(handler::get_by_key).put(handler::set))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state, require_auth));

    Router::new().nest("/api/settings", routes)
}
