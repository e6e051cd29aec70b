//! 令牌服务
//!
//! 签发、验证与吊销平台的全部令牌：
//! - `access` / `refresh` - 会话令牌
//! - `email_verification` / `password_reset` - 一次性操作令牌
//!
//! 吊销通过两条路径实现：
//! - 单个令牌：按 jti 写入黑名单，TTL 等于令牌剩余有效期
//! - 整个账户：写入签发水位线，早于水位线签发的令牌全部失效
//!
//! 黑名单/水位线存储不可用时验证 FAIL OPEN —— 可用性优先于严格性，
//! 避免存储故障放大为全站认证故障。

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::store::TtlStore;

/// Token kind. Determines lifetime and where the token is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    EmailVerification,
    PasswordReset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::EmailVerification => "email_verification",
            TokenKind::PasswordReset => "password_reset",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token 配置
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// 签名密钥 (应至少 32 字节)
    pub secret: String,
    /// 签发者
    pub issuer: String,
    /// access 令牌有效期 (分钟)
    pub access_minutes: i64,
    /// refresh 令牌有效期 (天)
    pub refresh_days: i64,
    /// 邮箱验证令牌有效期 (小时)
    pub email_verification_hours: i64,
    /// 密码重置令牌有效期 (分钟)
    pub password_reset_minutes: i64,
}

impl TokenConfig {
    /// 从环境变量加载；未设置密钥时生成临时密钥（生产环境 panic）
    pub fn from_env() -> Self {
        let secret = match std::env::var("TOKEN_SECRET") {
            Ok(s) if s.len() >= 32 => s,
            Ok(_) => {
                panic!("TOKEN_SECRET must be at least 32 characters long");
            }
            Err(_) => {
                let environment =
                    std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());
                if environment == "production" {
                    panic!("TOKEN_SECRET environment variable must be set in production!");
                }
                tracing::warn!(
                    "TOKEN_SECRET not set, generating a temporary key for development"
                );
                generate_secure_secret()
            }
        };

        Self {
            secret,
            issuer: std::env::var("TOKEN_ISSUER").unwrap_or_else(|_| "store-server".into()),
            access_minutes: env_i64("TOKEN_ACCESS_MINUTES", 30),
            refresh_days: env_i64("TOKEN_REFRESH_DAYS", 30),
            email_verification_hours: env_i64("TOKEN_EMAIL_VERIFICATION_HOURS", 48),
            password_reset_minutes: env_i64("TOKEN_PASSWORD_RESET_MINUTES", 30),
        }
    }

    fn lifetime(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => Duration::minutes(self.access_minutes),
            TokenKind::Refresh => Duration::days(self.refresh_days),
            TokenKind::EmailVerification => Duration::hours(self.email_verification_hours),
            TokenKind::PasswordReset => Duration::minutes(self.password_reset_minutes),
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 生成随机密钥 (hex 编码, 64 字符)
pub fn generate_secure_secret() -> String {
    let rng = SystemRandom::new();
    let mut key = [0u8; 32];
    // SystemRandom is documented to be infallible on supported platforms
    rng.fill(&mut key)
        .expect("system random generator unavailable");
    hex::encode(key)
}

/// Claims carried by every token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Token kind
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// Unique token id, used for individual revocation
    pub jti: String,
    /// Issued-at (seconds)
    pub iat: i64,
    /// Expiry (seconds)
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    ExpiredToken,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("wrong token kind: expected {expected}, got {actual}")]
    WrongKind {
        expected: TokenKind,
        actual: TokenKind,
    },

    #[error("token revoked")]
    Revoked,

    #[error("token generation failed: {0}")]
    GenerationFailed(String),

    #[error("revocation store unavailable: {0}")]
    StoreUnavailable(String),
}

/// An issued token plus the metadata callers may need to store or log.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: i64,
}

/// 令牌服务
pub struct TokenService {
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    store: Arc<dyn TtlStore>,
}

impl TokenService {
    pub fn new(config: TokenConfig, store: Arc<dyn TtlStore>) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
            store,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// 签发指定类型的令牌
    pub fn issue(&self, kind: TokenKind, subject: &str) -> Result<IssuedToken, TokenError> {
        let now = Utc::now();
        let expires = now + self.config.lifetime(kind);
        let jti = uuid::Uuid::new_v4().to_string();

        let claims = Claims {
            sub: subject.to_string(),
            kind,
            jti: jti.clone(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
            iss: self.config.issuer.clone(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| TokenError::GenerationFailed(e.to_string()))?;

        Ok(IssuedToken {
            token,
            jti,
            expires_at: expires.timestamp(),
        })
    }

    /// 验证令牌并返回 subject
    ///
    /// 依次检查：签名/过期 → 类型 → jti 黑名单 → 签发水位线。
    /// 黑名单与水位线查询失败时放行（fail open）。
    pub async fn verify(&self, token: &str, expected: TokenKind) -> Result<String, TokenError> {
        let claims = self.decode(token)?;

        if claims.kind != expected {
            return Err(TokenError::WrongKind {
                expected,
                actual: claims.kind,
            });
        }

        match self.store.get(&revoked_key(&claims.jti)).await {
            Ok(Some(_)) => return Err(TokenError::Revoked),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "token blacklist unavailable, failing open");
            }
        }

        match self.store.get(&watermark_key(&claims.sub)).await {
            Ok(Some(watermark)) => {
                if let Ok(wm) = watermark.parse::<i64>() {
                    if claims.iat < wm {
                        return Err(TokenError::Revoked);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "revocation watermark unavailable, failing open");
            }
        }

        Ok(claims.sub)
    }

    /// 吊销单个令牌
    ///
    /// 黑名单标记的 TTL 等于令牌剩余有效期，令牌自然过期时标记一并消失。
    pub async fn revoke(&self, token: &str) -> Result<(), TokenError> {
        let claims = match self.decode(token) {
            Ok(c) => c,
            // Already expired: nothing to blacklist
            Err(TokenError::ExpiredToken) => return Ok(()),
            Err(e) => return Err(e),
        };

        let remaining = claims.exp - Utc::now().timestamp();
        if remaining <= 0 {
            return Ok(());
        }

        self.store
            .put(
                &revoked_key(&claims.jti),
                "1".to_string(),
                StdDuration::from_secs(remaining as u64),
            )
            .await
            .map_err(|e| TokenError::StoreUnavailable(e.to_string()))
    }

    /// 吊销某个 subject 之前签发的所有令牌
    ///
    /// 写入水位线而非枚举令牌；TTL 取 refresh 最长有效期，
    /// 之后所有旧令牌都已自然过期，水位线不再需要。
    pub async fn revoke_all(&self, subject: &str) -> Result<(), TokenError> {
        let now = Utc::now().timestamp();
        let ttl = Duration::days(self.config.refresh_days)
            .to_std()
            .unwrap_or(StdDuration::from_secs(30 * 86_400));

        self.store
            .put(&watermark_key(subject), now.to_string(), ttl)
            .await
            .map_err(|e| TokenError::StoreUnavailable(e.to_string()))
    }

    fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::ExpiredToken,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::InvalidToken(e.to_string()),
            }
        })?;

        Ok(data.claims)
    }

    /// 从 Authorization 头提取令牌
    pub fn extract_from_header(header: &str) -> Option<&str> {
        header.strip_prefix("Bearer ")
    }
}

fn revoked_key(jti: &str) -> String {
    format!("token:revoked:{jti}")
}

fn watermark_key(subject: &str) -> String {
    format!("token:watermark:{subject}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryTtlStore;

    fn test_config() -> TokenConfig {
        TokenConfig {
            secret: "a-test-secret-that-is-long-enough-0123".to_string(),
            issuer: "store-server".to_string(),
            access_minutes: 30,
            refresh_days: 30,
            email_verification_hours: 48,
            password_reset_minutes: 30,
        }
    }

    fn service() -> TokenService {
        TokenService::new(test_config(), Arc::new(MemoryTtlStore::new()))
    }

    #[tokio::test]
    async fn issue_then_verify_returns_subject() {
        let svc = service();
        for kind in [
            TokenKind::Access,
            TokenKind::Refresh,
            TokenKind::EmailVerification,
            TokenKind::PasswordReset,
        ] {
            let issued = svc.issue(kind, "42").unwrap();
            let sub = svc.verify(&issued.token, kind).await.unwrap();
            assert_eq!(sub, "42");
        }
    }

    #[tokio::test]
    async fn kind_mismatch_is_rejected() {
        let svc = service();
        let issued = svc.issue(TokenKind::Refresh, "42").unwrap();
        let err = svc.verify(&issued.token, TokenKind::Access).await;
        assert!(matches!(err, Err(TokenError::WrongKind { .. })));
    }

    #[tokio::test]
    async fn tampered_token_is_rejected() {
        let svc = service();
        let issued = svc.issue(TokenKind::Access, "42").unwrap();
        let mut token = issued.token;
        token.pop();
        token.push('x');
        assert!(svc.verify(&token, TokenKind::Access).await.is_err());
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let svc = service();
        let issued = svc.issue(TokenKind::Access, "42").unwrap();

        let mut other_config = test_config();
        other_config.secret = "another-secret-that-is-long-enough-xyz".to_string();
        let other = TokenService::new(other_config, Arc::new(MemoryTtlStore::new()));
        assert!(matches!(
            other.verify(&issued.token, TokenKind::Access).await,
            Err(TokenError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn revoked_token_fails_verification() {
        let svc = service();
        let issued = svc.issue(TokenKind::Refresh, "42").unwrap();
        svc.verify(&issued.token, TokenKind::Refresh).await.unwrap();

        svc.revoke(&issued.token).await.unwrap();
        assert!(matches!(
            svc.verify(&issued.token, TokenKind::Refresh).await,
            Err(TokenError::Revoked)
        ));
    }

    #[tokio::test]
    async fn revoke_all_invalidates_only_earlier_tokens() {
        let svc = service();
        let before = svc.issue(TokenKind::Refresh, "42").unwrap();

        // Watermark granularity is one second
        tokio::time::sleep(StdDuration::from_millis(1100)).await;
        svc.revoke_all("42").await.unwrap();

        assert!(matches!(
            svc.verify(&before.token, TokenKind::Refresh).await,
            Err(TokenError::Revoked)
        ));

        let after = svc.issue(TokenKind::Refresh, "42").unwrap();
        assert_eq!(
            svc.verify(&after.token, TokenKind::Refresh).await.unwrap(),
            "42"
        );

        // Other subjects are unaffected
        let other = svc.issue(TokenKind::Refresh, "7").unwrap();
        assert!(svc.verify(&other.token, TokenKind::Refresh).await.is_ok());
    }

    #[tokio::test]
    async fn blacklist_outage_fails_open() {
        struct FailingStore;

        #[async_trait::async_trait]
        impl TtlStore for FailingStore {
            async fn put(
                &self,
                _: &str,
                _: String,
                _: StdDuration,
            ) -> Result<(), crate::auth::StoreError> {
                Err(crate::auth::StoreError::Unavailable("down".into()))
            }
            async fn get(&self, _: &str) -> Result<Option<String>, crate::auth::StoreError> {
                Err(crate::auth::StoreError::Unavailable("down".into()))
            }
            async fn incr(
                &self,
                _: &str,
                _: StdDuration,
            ) -> Result<u64, crate::auth::StoreError> {
                Err(crate::auth::StoreError::Unavailable("down".into()))
            }
            async fn remove(&self, _: &str) -> Result<(), crate::auth::StoreError> {
                Err(crate::auth::StoreError::Unavailable("down".into()))
            }
        }

        let svc = TokenService::new(test_config(), Arc::new(FailingStore));
        let issued = svc.issue(TokenKind::Access, "42").unwrap();
        // Store is down: verification still succeeds
        assert_eq!(
            svc.verify(&issued.token, TokenKind::Access).await.unwrap(),
            "42"
        );
    }
}
