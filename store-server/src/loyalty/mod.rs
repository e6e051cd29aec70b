//! Loyalty Accrual Engine
//!
//! 订单完成后按消费金额累积积分。
//!
//! 幂等：每个订单只允许一条 earn_purchase 流水（唯一索引兜底），
//! 清扫任务或人工触发重复调用不会重复加分。
//! 失败策略：积分累积是 best-effort，调用方记录日志后继续，
//! 绝不回滚触发它的订单状态迁移。

use sqlx::SqlitePool;
use thiserror::Error;

use crate::db::repository::{loyalty, RepoError};
use crate::settings::{defaults, keys, SettingsService};
use shared::models::{PointTransaction, PointTransactionKind};

#[derive(Debug, Error)]
pub enum LoyaltyError {
    #[error("User {0} not found")]
    UserNotFound(i64),

    #[error("Insufficient points: balance {balance}, requested {requested}")]
    InsufficientPoints { balance: i64, requested: i64 },

    #[error("Invalid points amount: {0}")]
    InvalidAmount(i64),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<RepoError> for LoyaltyError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound(msg) => LoyaltyError::Storage(msg),
            other => LoyaltyError::Storage(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for LoyaltyError {
    fn from(e: sqlx::Error) -> Self {
        LoyaltyError::Storage(e.to_string())
    }
}

impl From<LoyaltyError> for crate::utils::AppError {
    fn from(e: LoyaltyError) -> Self {
        match e {
            LoyaltyError::UserNotFound(id) => crate::utils::AppError::NotFound(format!("User {id}")),
            LoyaltyError::InsufficientPoints { .. } => crate::utils::AppError::Validation(e.to_string()),
            LoyaltyError::InvalidAmount(_) => crate::utils::AppError::Validation(e.to_string()),
            LoyaltyError::Storage(msg) => crate::utils::AppError::Database(msg),
        }
    }
}

#[derive(Clone)]
pub struct LoyaltyEngine {
    pool: SqlitePool,
    settings: SettingsService,
}

impl LoyaltyEngine {
    pub fn new(pool: SqlitePool, settings: SettingsService) -> Self {
        Self { pool, settings }
    }

    /// Credit points for a completed order.
    ///
    /// Points = floor(total_amount × earn_rate). Returns `Ok(None)` when the
    /// order was already credited or rounds to zero points.
    pub async fn process_order_earning(
        &self,
        order_id: i64,
        user_id: i64,
        total_amount: f64,
    ) -> Result<Option<PointTransaction>, LoyaltyError> {
        let rate = self
            .settings
            .get_f64_or(keys::LOYALTY_EARN_RATE, defaults::LOYALTY_EARN_RATE)
            .await;
        let points = (total_amount * rate).floor() as i64;
        if points <= 0 {
            tracing::debug!(order_id, total_amount, rate, "order earns no points");
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;
        if !loyalty::try_insert_earn(&mut tx, user_id, order_id, points).await? {
            tracing::debug!(order_id, "order already credited, skipping accrual");
            return Ok(None);
        }
        loyalty::add_points(&mut tx, user_id, points).await?;
        tx.commit().await?;

        tracing::info!(order_id, user_id, points, "loyalty points credited");
        loyalty::earn_entry_for_order(&self.pool, order_id)
            .await
            .map_err(Into::into)
    }

    /// Spend points. The balance check and the debit are one conditional
    /// update; the ledger entry records a negative amount.
    pub async fn redeem(
        &self,
        user_id: i64,
        points: i64,
        note: Option<&str>,
    ) -> Result<PointTransaction, LoyaltyError> {
        if points <= 0 {
            return Err(LoyaltyError::InvalidAmount(points));
        }

        let mut tx = self.pool.begin().await?;
        if !loyalty::try_spend_points(&mut tx, user_id, points).await? {
            let balance = loyalty::balance(&mut *tx, user_id)
                .await
                .map_err(|_| LoyaltyError::UserNotFound(user_id))?;
            return Err(LoyaltyError::InsufficientPoints {
                balance,
                requested: points,
            });
        }
        loyalty::insert_entry(&mut tx, user_id, PointTransactionKind::Redeem, -points, note).await?;
        tx.commit().await?;

        let history = loyalty::history(&self.pool, user_id).await?;
        history
            .into_iter()
            .find(|t| t.kind == PointTransactionKind::Redeem)
            .ok_or_else(|| LoyaltyError::Storage("redeem entry missing after commit".into()))
    }

    pub async fn balance(&self, user_id: i64) -> Result<i64, LoyaltyError> {
        loyalty::balance(&self.pool, user_id)
            .await
            .map_err(|_| LoyaltyError::UserNotFound(user_id))
    }

    pub async fn history(&self, user_id: i64) -> Result<Vec<PointTransaction>, LoyaltyError> {
        Ok(loyalty::history(&self.pool, user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;

    async fn seed_user(pool: &SqlitePool) -> i64 {
        let now = shared::util::now_millis();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, display_name, created_at, updated_at) \
             VALUES (1, 'a@example.com', 'x', 'Alice', ?1, ?1)",
        )
        .bind(now)
        .execute(pool)
        .await
        .unwrap();
        1
    }

    fn engine(pool: &SqlitePool) -> LoyaltyEngine {
        LoyaltyEngine::new(pool.clone(), SettingsService::new(pool.clone()))
    }

    #[tokio::test]
    async fn earning_credits_points_at_default_rate() {
        let db = DbService::in_memory().await.unwrap();
        let user = seed_user(&db.pool).await;
        let engine = engine(&db.pool);

        // 250,000 × 0.0001 = 25 points
        let entry = engine
            .process_order_earning(1001, user, 250_000.0)
            .await
            .unwrap()
            .expect("entry should be created");
        assert_eq!(entry.points, 25);
        assert_eq!(entry.kind, PointTransactionKind::EarnPurchase);
        assert_eq!(entry.order_id, Some(1001));
        assert_eq!(engine.balance(user).await.unwrap(), 25);
    }

    #[tokio::test]
    async fn double_accrual_credits_once() {
        let db = DbService::in_memory().await.unwrap();
        let user = seed_user(&db.pool).await;
        let engine = engine(&db.pool);

        engine.process_order_earning(1001, user, 250_000.0).await.unwrap();
        let balance_after_first = engine.balance(user).await.unwrap();

        let second = engine.process_order_earning(1001, user, 250_000.0).await.unwrap();
        assert!(second.is_none(), "second accrual must be a no-op");
        assert_eq!(engine.balance(user).await.unwrap(), balance_after_first);

        let history = engine.history(user).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn distinct_orders_each_earn() {
        let db = DbService::in_memory().await.unwrap();
        let user = seed_user(&db.pool).await;
        let engine = engine(&db.pool);

        engine.process_order_earning(1001, user, 100_000.0).await.unwrap();
        engine.process_order_earning(1002, user, 200_000.0).await.unwrap();
        assert_eq!(engine.balance(user).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn tiny_order_earns_nothing() {
        let db = DbService::in_memory().await.unwrap();
        let user = seed_user(&db.pool).await;
        let engine = engine(&db.pool);

        let entry = engine.process_order_earning(1001, user, 5_000.0).await.unwrap();
        assert!(entry.is_none());
        assert_eq!(engine.balance(user).await.unwrap(), 0);
        assert!(engine.history(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn earn_rate_is_runtime_tunable() {
        let db = DbService::in_memory().await.unwrap();
        let user = seed_user(&db.pool).await;
        let settings = SettingsService::new(db.pool.clone());
        settings
            .set(keys::LOYALTY_EARN_RATE, shared::models::SettingValue::Number(0.001))
            .await
            .unwrap();
        let engine = engine(&db.pool);

        engine.process_order_earning(1001, user, 250_000.0).await.unwrap();
        assert_eq!(engine.balance(user).await.unwrap(), 250);
    }

    #[tokio::test]
    async fn redeem_debits_and_records() {
        let db = DbService::in_memory().await.unwrap();
        let user = seed_user(&db.pool).await;
        let engine = engine(&db.pool);

        engine.process_order_earning(1001, user, 1_000_000.0).await.unwrap();
        assert_eq!(engine.balance(user).await.unwrap(), 100);

        let entry = engine.redeem(user, 40, Some("voucher")).await.unwrap();
        assert_eq!(entry.points, -40);
        assert_eq!(engine.balance(user).await.unwrap(), 60);
    }

    #[tokio::test]
    async fn redeem_rejects_overdraft() {
        let db = DbService::in_memory().await.unwrap();
        let user = seed_user(&db.pool).await;
        let engine = engine(&db.pool);

        engine.process_order_earning(1001, user, 100_000.0).await.unwrap();
        let err = engine.redeem(user, 50, None).await.unwrap_err();
        assert!(matches!(
            err,
            LoyaltyError::InsufficientPoints { balance: 10, requested: 50 }
        ));
        // Balance untouched, no ledger entry written
        assert_eq!(engine.balance(user).await.unwrap(), 10);
        assert_eq!(engine.history(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn balance_equals_ledger_sum() {
        let db = DbService::in_memory().await.unwrap();
        let user = seed_user(&db.pool).await;
        let engine = engine(&db.pool);

        engine.process_order_earning(1, user, 500_000.0).await.unwrap();
        engine.process_order_earning(2, user, 300_000.0).await.unwrap();
        engine.redeem(user, 30, None).await.unwrap();

        let ledger_sum: i64 = engine
            .history(user)
            .await
            .unwrap()
            .iter()
            .map(|t| t.points)
            .sum();
        assert_eq!(engine.balance(user).await.unwrap(), ledger_sum);
    }
}
