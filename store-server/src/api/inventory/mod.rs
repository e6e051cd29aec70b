//! Inventory API 模块 (仓库 + 库存 + 告警)

mod handler;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth::middleware::{require_admin, require_auth};
use crate::core::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    let routes = Router::new()
        .route("/warehouses", get(handler::list_warehouses).post(handler::create_warehouse))
        .route("/warehouses/{id}", get(handler::get_warehouse).delete(handler::delete_warehouse))
        .route("/stock/{variant_id}", get(handler::stock_by_variant))
        .route("/transactions/{variant_id}", get(handler::transactions_by_variant))
        .route("/adjust", post(handler::adjust))
        .route("/transfer", post(handler::transfer))
        .route("/alerts", get(handler::alerts))
        .route("/alerts/{id}/resolve", post(handler::resolve_alert))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state, require_auth));

    Router::new().nest("/api/inventory", routes)
}
