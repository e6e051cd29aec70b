//! Auth API 模块

mod handler;

use axum::{
    middleware,
    routing::post,
    Router,
};

use crate::auth::middleware::require_auth;
use crate::auth::rate_limit::{login_rate_limit, register_rate_limit};
use crate::core::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    // 公开路由：注册/登录有限流，重置与验证靠一次性令牌自证
    let public = Router::new()
        .route(
            "/register",
            post(handler::register)
                .layer(middleware::from_fn_with_state(state.clone(), register_rate_limit)),
        )
        .route(
            "/login",
            post(handler::login)
                .layer(middleware::from_fn_with_state(state.clone(), login_rate_limit)),
        )
        .route("/refresh", post(handler::refresh))
        .route("/password-reset/request", post(handler::request_password_reset))
        .route("/password-reset/confirm", post(handler::confirm_password_reset))
        .route("/verify-email", post(handler::verify_email));

    // 会话路由：需要有效 access 令牌
    let session = Router::new()
        .route("/logout", post(handler::logout))
        .route("/logout-all", post(handler::logout_all))
        .layer(middleware::from_fn_with_state(state, require_auth));

    Router::new().nest("/api/auth", public.merge(session))
}
