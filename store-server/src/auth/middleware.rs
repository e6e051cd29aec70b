//! 认证中间件
//!
//! 验证 access 令牌，加载用户并注入 [`CurrentUser`] 扩展。

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use super::token::{TokenError, TokenKind, TokenService};
use crate::core::AppState;
use crate::db::repository::user;
use crate::utils::AppError;

/// 当前请求用户 (由认证中间件注入)
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    pub role: String,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::ExpiredToken => AppError::TokenExpired,
            TokenError::Revoked => AppError::TokenRevoked,
            TokenError::WrongKind { .. } | TokenError::InvalidSignature => AppError::InvalidToken,
            TokenError::InvalidToken(_) => AppError::InvalidToken,
            TokenError::GenerationFailed(msg) | TokenError::StoreUnavailable(msg) => {
                AppError::Internal(msg)
            }
        }
    }
}

/// Verify the bearer access token and attach [`CurrentUser`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = TokenService::extract_from_header(header).ok_or(AppError::Unauthorized)?;
    let subject = state.tokens.verify(token, TokenKind::Access).await?;
    let user_id: i64 = subject.parse().map_err(|_| AppError::InvalidToken)?;

    let user = user::find_by_id(&state.pool, user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(CurrentUser {
        id: user.id,
        email: user.email,
        display_name: user.display_name,
        role: user.role,
    });

    Ok(next.run(request).await)
}

/// Reject non-admin callers. Must run after [`require_auth`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<CurrentUser>()
        .ok_or(AppError::Unauthorized)?;

    if !user.is_admin() {
        return Err(AppError::Forbidden("admin role required".to_string()));
    }

    Ok(next.run(request).await)
}
