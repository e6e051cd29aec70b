//! Runtime Settings Service
//!
//! 运行时可改配置：低库存阈值、自动完成宽限期、积分比例等。
//! 读不到或类型不符时回落到默认值并告警，绝不让坏配置打断请求。

use sqlx::{Sqlite, SqlitePool};

use crate::db::repository::setting;
use crate::db::repository::RepoResult;
use shared::models::SettingValue;

/// Well-known setting keys.
pub mod keys {
    /// Days an order rests in `delivered` before auto-completion.
    pub const AUTO_COMPLETE_GRACE_DAYS: &str = "orders.auto_complete_grace_days";
    /// Loyalty points earned per currency unit spent.
    pub const LOYALTY_EARN_RATE: &str = "loyalty.earn_rate";
    /// Default low-stock alert threshold (per-variant override wins).
    pub const LOW_STOCK_THRESHOLD: &str = "inventory.low_stock_threshold";
    /// Login attempts allowed per window (env config is the fallback).
    pub const LOGIN_RATE_LIMIT_MAX: &str = "auth.login_rate_limit.max_attempts";
    /// Login rate-limit window in seconds.
    pub const LOGIN_RATE_LIMIT_WINDOW: &str = "auth.login_rate_limit.window_secs";
    /// Registration attempts allowed per window.
    pub const REGISTER_RATE_LIMIT_MAX: &str = "auth.register_rate_limit.max_attempts";
    /// Registration rate-limit window in seconds.
    pub const REGISTER_RATE_LIMIT_WINDOW: &str = "auth.register_rate_limit.window_secs";
}

/// Built-in defaults used when a key is absent.
pub mod defaults {
    pub const AUTO_COMPLETE_GRACE_DAYS: i64 = 7;
    /// 1 point per 10,000 currency units.
    pub const LOYALTY_EARN_RATE: f64 = 0.0001;
    pub const LOW_STOCK_THRESHOLD: i64 = 5;
}

#[derive(Clone)]
pub struct SettingsService {
    pool: SqlitePool,
}

impl SettingsService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> RepoResult<Option<SettingValue>> {
        get_with(&self.pool, key).await
    }

    pub async fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        match self.get(key).await {
            Ok(Some(v)) => v.as_i64().unwrap_or_else(|| {
                tracing::warn!(key, "setting has wrong type, using default");
                default
            }),
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read setting, using default");
                default
            }
        }
    }

    pub async fn get_f64_or(&self, key: &str, default: f64) -> f64 {
        match self.get(key).await {
            Ok(Some(v)) => v.as_f64().unwrap_or_else(|| {
                tracing::warn!(key, "setting has wrong type, using default");
                default
            }),
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read setting, using default");
                default
            }
        }
    }

    pub async fn get_bool_or(&self, key: &str, default: bool) -> bool {
        match self.get(key).await {
            Ok(Some(v)) => v.as_bool().unwrap_or(default),
            _ => default,
        }
    }

    pub async fn set(&self, key: &str, value: SettingValue) -> RepoResult<()> {
        let (value_type, raw) = value.to_storage();
        setting::upsert(&self.pool, key, &raw, value_type).await
    }

    pub async fn all(&self) -> RepoResult<Vec<shared::models::Setting>> {
        setting::all(&self.pool).await
    }
}

/// Executor-generic read so in-transaction code can see settings too.
pub async fn get_with<'e, E>(ex: E, key: &str) -> RepoResult<Option<SettingValue>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let Some(row) = setting::get(ex, key).await? else {
        return Ok(None);
    };
    match SettingValue::parse(&row.value_type, &row.value) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            tracing::warn!(key, error = %e, "malformed setting value");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;

    #[tokio::test]
    async fn missing_key_falls_back_to_default() {
        let db = DbService::in_memory().await.unwrap();
        let svc = SettingsService::new(db.pool.clone());
        assert_eq!(svc.get_i64_or(keys::AUTO_COMPLETE_GRACE_DAYS, 7).await, 7);
    }

    #[tokio::test]
    async fn set_then_get_typed_value() {
        let db = DbService::in_memory().await.unwrap();
        let svc = SettingsService::new(db.pool.clone());
        svc.set(keys::AUTO_COMPLETE_GRACE_DAYS, SettingValue::Number(3.0))
            .await
            .unwrap();
        assert_eq!(svc.get_i64_or(keys::AUTO_COMPLETE_GRACE_DAYS, 7).await, 3);
    }

    #[tokio::test]
    async fn overwrite_changes_type_and_value() {
        let db = DbService::in_memory().await.unwrap();
        let svc = SettingsService::new(db.pool.clone());
        svc.set("flag", SettingValue::Boolean(true)).await.unwrap();
        assert!(svc.get_bool_or("flag", false).await);
        svc.set("flag", SettingValue::String("off".into())).await.unwrap();
        // Wrong type now: falls back to the default
        assert!(!svc.get_bool_or("flag", false).await);
    }
}
