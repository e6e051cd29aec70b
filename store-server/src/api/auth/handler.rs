//! Auth API Handlers

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};

use crate::auth::password::{hash_password, verify_password};
use crate::auth::{CurrentUser, TokenKind};
use crate::core::AppState;
use crate::db::repository::user;
use crate::utils::{ok, AppError, AppResponse, AppResult};
use shared::models::{UserCreate, UserPublic};

#[derive(Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserPublic,
}

/// POST /api/auth/register - 注册
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<UserCreate>,
) -> AppResult<Json<TokenPair>> {
    if payload.password.len() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    if !payload.email.contains('@') {
        return Err(AppError::Validation("invalid email address".into()));
    }

    let hash = hash_password(&payload.password)?;
    let created = user::create(
        &state.pool,
        &payload.email,
        &hash,
        &payload.display_name,
        "customer",
    )
    .await
    .map_err(|e| match e {
        crate::db::repository::RepoError::Duplicate(_) => {
            AppError::Conflict("email already registered".into())
        }
        other => other.into(),
    })?;

    // Verification token is handed to the mail worker; delivery itself is
    // out of process.
    let verification = state
        .tokens
        .issue(TokenKind::EmailVerification, &created.id.to_string())?;
    tracing::info!(user_id = created.id, jti = %verification.jti, "email verification token issued");

    issue_pair(&state, created).await
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/login - 登录
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<TokenPair>> {
    let found = user::find_by_email(&state.pool, &payload.email).await?;

    // Uniform failure for unknown email and wrong password
    let Some(account) = found else {
        return Err(AppError::invalid_credentials());
    };
    if !verify_password(&payload.password, &account.password_hash) {
        return Err(AppError::invalid_credentials());
    }

    issue_pair(&state, account).await
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /api/auth/refresh - 刷新令牌（旋转：旧 refresh 作废）
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let subject = state
        .tokens
        .verify(&payload.refresh_token, TokenKind::Refresh)
        .await?;
    let user_id: i64 = subject.parse().map_err(|_| AppError::InvalidToken)?;

    let account = user::find_by_id(&state.pool, user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::Unauthorized)?;

    // Rotate: the presented refresh token is single-use
    state.tokens.revoke(&payload.refresh_token).await?;

    issue_pair(&state, account).await
}

#[derive(Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

/// POST /api/auth/logout - 注销当前 refresh 令牌
pub async fn logout(
    State(state): State<AppState>,
    Extension(_user): Extension<CurrentUser>,
    Json(payload): Json<LogoutRequest>,
) -> AppResult<Json<AppResponse<()>>> {
    if let Some(token) = payload.refresh_token {
        state.tokens.revoke(&token).await?;
    }
    Ok(ok(()))
}

/// POST /api/auth/logout-all - 吊销该用户的所有令牌
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<AppResponse<()>>> {
    state.tokens.revoke_all(&user.id.to_string()).await?;
    Ok(ok(()))
}

#[derive(Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// POST /api/auth/password-reset/request
///
/// Always answers success — the response must not reveal whether the
/// email exists.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> AppResult<Json<AppResponse<()>>> {
    if let Some(account) = user::find_by_email(&state.pool, &payload.email).await? {
        let token = state
            .tokens
            .issue(TokenKind::PasswordReset, &account.id.to_string())?;
        tracing::info!(user_id = account.id, jti = %token.jti, "password reset token issued");
    }
    Ok(ok(()))
}

#[derive(Deserialize)]
pub struct PasswordResetConfirm {
    pub token: String,
    pub new_password: String,
}

/// POST /api/auth/password-reset/confirm
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirm>,
) -> AppResult<Json<AppResponse<()>>> {
    if payload.new_password.len() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    let subject = state
        .tokens
        .verify(&payload.token, TokenKind::PasswordReset)
        .await?;
    let user_id: i64 = subject.parse().map_err(|_| AppError::InvalidToken)?;

    let hash = hash_password(&payload.new_password)?;
    user::set_password(&state.pool, user_id, &hash).await?;

    // The reset token is single-use, and every open session dies with it
    state.tokens.revoke(&payload.token).await?;
    state.tokens.revoke_all(&subject).await?;
    Ok(ok(()))
}

#[derive(Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

/// POST /api/auth/verify-email
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> AppResult<Json<AppResponse<()>>> {
    let subject = state
        .tokens
        .verify(&payload.token, TokenKind::EmailVerification)
        .await?;
    let user_id: i64 = subject.parse().map_err(|_| AppError::InvalidToken)?;

    user::set_email_verified(&state.pool, user_id).await?;
    state.tokens.revoke(&payload.token).await?;
    Ok(ok(()))
}

async fn issue_pair(state: &AppState, account: shared::models::User) -> AppResult<Json<TokenPair>> {
    let subject = account.id.to_string();
    let access = state.tokens.issue(TokenKind::Access, &subject)?;
    let refresh = state.tokens.issue(TokenKind::Refresh, &subject)?;
    Ok(Json(TokenPair {
        access_token: access.token,
        refresh_token: refresh.token,
        user: account.into(),
    }))
}
