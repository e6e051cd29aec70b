//! Application-layer rate limiting for login and registration routes
//!
//! Counters live in the expiring key/value store with the window as TTL.
//! On store errors the check FAILS OPEN: an infrastructure outage must not
//! lock every caller out.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::store::TtlStore;
use crate::core::AppState;
use crate::settings::keys;
use crate::utils::AppError;

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn TtlStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn TtlStore>) -> Self {
        Self { store }
    }

    /// Returns `true` if the caller is within limits.
    ///
    /// The counter key is (action, identifier); the TTL starts at the first
    /// attempt in the window.
    pub async fn check_rate_limit(
        &self,
        identifier: &str,
        action: &str,
        max_attempts: u64,
        window: Duration,
    ) -> bool {
        let key = format!("rate:{action}:{identifier}");
        match self.store.incr(&key, window).await {
            Ok(count) => count <= max_attempts,
            Err(e) => {
                tracing::warn!(action, error = %e, "rate limit store unavailable, failing open");
                true
            }
        }
    }
}

/// Extract client IP: X-Forwarded-For header first, then peer address.
fn extract_ip(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(val) = forwarded.to_str() {
            if let Some(first) = val.split(',').next() {
                let ip = first.trim();
                if !ip.is_empty() {
                    return ip.to_owned();
                }
            }
        }
    }

    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Rate limit middleware for login attempts.
///
/// Thresholds come from the settings store, falling back to env config.
pub async fn login_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = extract_ip(&request);
    let rule = &state.config.login_limit;
    let max = state
        .settings
        .get_i64_or(keys::LOGIN_RATE_LIMIT_MAX, rule.max_attempts as i64)
        .await
        .max(1) as u64;
    let window = state
        .settings
        .get_i64_or(keys::LOGIN_RATE_LIMIT_WINDOW, rule.window_secs as i64)
        .await
        .max(1) as u64;
    if !state
        .rate_limiter
        .check_rate_limit(&ip, "login", max, Duration::from_secs(window))
        .await
    {
        return Err(AppError::RateLimited);
    }
    Ok(next.run(request).await)
}

/// Rate limit middleware for registration.
pub async fn register_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = extract_ip(&request);
    let rule = &state.config.register_limit;
    let max = state
        .settings
        .get_i64_or(keys::REGISTER_RATE_LIMIT_MAX, rule.max_attempts as i64)
        .await
        .max(1) as u64;
    let window = state
        .settings
        .get_i64_or(keys::REGISTER_RATE_LIMIT_WINDOW, rule.window_secs as i64)
        .await
        .max(1) as u64;
    if !state
        .rate_limiter
        .check_rate_limit(&ip, "register", max, Duration::from_secs(window))
        .await
    {
        return Err(AppError::RateLimited);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{MemoryTtlStore, StoreError};

    #[tokio::test]
    async fn allows_up_to_max_attempts() {
        let limiter = RateLimiter::new(Arc::new(MemoryTtlStore::new()));
        for _ in 0..5 {
            assert!(
                limiter
                    .check_rate_limit("1.2.3.4", "login", 5, Duration::from_secs(60))
                    .await
            );
        }
        assert!(
            !limiter
                .check_rate_limit("1.2.3.4", "login", 5, Duration::from_secs(60))
                .await
        );
    }

    #[tokio::test]
    async fn identifiers_and_actions_are_independent() {
        let limiter = RateLimiter::new(Arc::new(MemoryTtlStore::new()));
        for _ in 0..3 {
            limiter
                .check_rate_limit("1.2.3.4", "login", 3, Duration::from_secs(60))
                .await;
        }
        assert!(
            !limiter
                .check_rate_limit("1.2.3.4", "login", 3, Duration::from_secs(60))
                .await
        );
        // Different IP, same action
        assert!(
            limiter
                .check_rate_limit("5.6.7.8", "login", 3, Duration::from_secs(60))
                .await
        );
        // Same IP, different action
        assert!(
            limiter
                .check_rate_limit("1.2.3.4", "register", 3, Duration::from_secs(60))
                .await
        );
    }

    #[tokio::test]
    async fn window_expiry_resets_the_counter() {
        let limiter = RateLimiter::new(Arc::new(MemoryTtlStore::new()));
        for _ in 0..2 {
            limiter
                .check_rate_limit("ip", "login", 2, Duration::from_millis(30))
                .await;
        }
        assert!(
            !limiter
                .check_rate_limit("ip", "login", 2, Duration::from_millis(30))
                .await
        );
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(
            limiter
                .check_rate_limit("ip", "login", 2, Duration::from_millis(30))
                .await
        );
    }

    #[tokio::test]
    async fn store_outage_fails_open() {
        struct FailingStore;

        #[async_trait::async_trait]
        impl TtlStore for FailingStore {
            async fn put(&self, _: &str, _: String, _: Duration) -> Result<(), StoreError> {
                Err(StoreError::Unavailable("down".into()))
            }
            async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
                Err(StoreError::Unavailable("down".into()))
            }
            async fn incr(&self, _: &str, _: Duration) -> Result<u64, StoreError> {
                Err(StoreError::Unavailable("down".into()))
            }
            async fn remove(&self, _: &str) -> Result<(), StoreError> {
                Err(StoreError::Unavailable("down".into()))
            }
        }

        let limiter = RateLimiter::new(Arc::new(FailingStore));
        // Every check passes while the store is down
        for _ in 0..100 {
            assert!(
                limiter
                    .check_rate_limit("ip", "login", 1, Duration::from_secs(60))
                    .await
            );
        }
    }
}
