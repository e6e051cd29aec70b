//! Auto-Completion Sweeper
//!
//! 定时把送达后超过宽限期的订单推进到 completed。
//!
//! 批次是一个事务：所有候选订单要么一起完成，要么（出错时）一个都不
//! 变，不存在半批提交。积分累积在批次提交后逐单执行，单个失败只记
//! 日志，不影响其余订单。

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use super::lifecycle::{self, AccrualDue, LifecycleError, LifecycleManager};
use crate::settings::{defaults, keys, SettingsService};
use shared::models::OrderStatus;
use shared::SYSTEM_ACTOR;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Outcome of one sweep run.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Orders whose grace window had elapsed.
    pub eligible: usize,
    /// Orders transitioned to completed (equals `eligible` on success).
    pub completed: usize,
}

pub struct CompletionSweeper {
    pool: SqlitePool,
    lifecycle: Arc<LifecycleManager>,
    settings: SettingsService,
}

impl CompletionSweeper {
    pub fn new(pool: SqlitePool, lifecycle: Arc<LifecycleManager>, settings: SettingsService) -> Self {
        Self {
            pool,
            lifecycle,
            settings,
        }
    }

    /// One sweep pass over all eligible orders.
    pub async fn run_once(&self) -> Result<SweepReport, LifecycleError> {
        let grace_days = self
            .settings
            .get_i64_or(keys::AUTO_COMPLETE_GRACE_DAYS, defaults::AUTO_COMPLETE_GRACE_DAYS)
            .await;
        let cutoff = shared::util::now_millis() - grace_days * MILLIS_PER_DAY;

        let mut tx = self.pool.begin().await?;
        let candidates =
            crate::db::repository::order::delivered_before(&mut tx, cutoff).await?;

        let mut report = SweepReport {
            eligible: candidates.len(),
            ..Default::default()
        };
        let mut accruals: Vec<AccrualDue> = Vec::new();

        let comment = format!("Auto-completed after {grace_days}-day grace window");
        for candidate in &candidates {
            let outcome = lifecycle::transition_in(
                &mut tx,
                candidate.id,
                OrderStatus::Completed,
                SYSTEM_ACTOR,
                Some(&comment),
            )
            .await?;
            if outcome.applied {
                report.completed += 1;
                accruals.extend(outcome.accrual);
            }
        }

        // Single commit point: a failure above rolled everything back
        tx.commit().await?;

        for due in &accruals {
            self.lifecycle.settle_accrual(due).await;
        }

        if report.completed > 0 {
            tracing::info!(
                completed = report.completed,
                grace_days,
                "auto-completion sweep finished"
            );
        }
        Ok(report)
    }

    /// Periodic loop; runs until the shutdown token fires.
    pub async fn run(self: Arc<Self>, interval_secs: u64, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::error!(error = %e, "auto-completion sweep failed, batch rolled back");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::debug!("completion sweeper stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use crate::loyalty::LoyaltyEngine;
    use shared::models::SettingValue;

    async fn seed(pool: &SqlitePool) {
        let now = shared::util::now_millis();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, display_name, created_at, updated_at) \
             VALUES (1, 'a@example.com', 'x', 'Alice', ?1, ?1)",
        )
        .bind(now)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn insert_delivered_order(pool: &SqlitePool, id: i64, delivered_ago_millis: i64) {
        let now = shared::util::now_millis();
        sqlx::query(
            "INSERT INTO orders (id, order_number, user_id, status, total_amount, placed_at, \
             delivered_at, created_at, updated_at) \
             VALUES (?1, ?2, 1, 'delivered', 250000, ?3, ?4, ?3, ?3)",
        )
        .bind(id)
        .bind(format!("SO-TEST-{id}"))
        .bind(now)
        .bind(now - delivered_ago_millis)
        .execute(pool)
        .await
        .unwrap();
    }

    fn sweeper(pool: &SqlitePool) -> CompletionSweeper {
        let settings = SettingsService::new(pool.clone());
        let loyalty = LoyaltyEngine::new(pool.clone(), settings.clone());
        let lifecycle = Arc::new(LifecycleManager::new(pool.clone(), loyalty));
        CompletionSweeper::new(pool.clone(), lifecycle, settings)
    }

    #[tokio::test]
    async fn completes_orders_past_the_grace_window() {
        let db = DbService::in_memory().await.unwrap();
        seed(&db.pool).await;
        insert_delivered_order(&db.pool, 100, 8 * MILLIS_PER_DAY).await;
        insert_delivered_order(&db.pool, 101, 6 * MILLIS_PER_DAY).await;

        let report = sweeper(&db.pool).run_once().await.unwrap();
        assert_eq!(report.eligible, 1);
        assert_eq!(report.completed, 1);

        let status: String = sqlx::query_scalar("SELECT status FROM orders WHERE id = 100")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(status, "completed");

        // The younger order is untouched
        let status: String = sqlx::query_scalar("SELECT status FROM orders WHERE id = 101")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(status, "delivered");
    }

    #[tokio::test]
    async fn writes_one_history_row_with_the_grace_comment() {
        let db = DbService::in_memory().await.unwrap();
        seed(&db.pool).await;
        insert_delivered_order(&db.pool, 100, 8 * MILLIS_PER_DAY).await;

        sweeper(&db.pool).run_once().await.unwrap();

        let rows: Vec<(String, String, i64, String)> = sqlx::query_as(
            "SELECT old_status, new_status, actor_id, comment FROM order_status_history \
             WHERE order_id = 100",
        )
        .fetch_all(&db.pool)
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "delivered");
        assert_eq!(rows[0].1, "completed");
        assert_eq!(rows[0].2, SYSTEM_ACTOR);
        assert!(rows[0].3.contains("7-day grace window"));
    }

    #[tokio::test]
    async fn triggers_loyalty_accrual_and_spend_aggregate() {
        let db = DbService::in_memory().await.unwrap();
        seed(&db.pool).await;
        insert_delivered_order(&db.pool, 100, 8 * MILLIS_PER_DAY).await;

        sweeper(&db.pool).run_once().await.unwrap();

        let (points, spent): (i64, f64) =
            sqlx::query_as("SELECT points_balance, total_spent FROM users WHERE id = 1")
                .fetch_one(&db.pool)
                .await
                .unwrap();
        assert_eq!(points, 25); // 250,000 at the default earn rate
        assert_eq!(spent, 250_000.0);

        let earns: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM point_transactions WHERE order_id = 100 AND kind = 'earn_purchase'",
        )
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(earns, 1);
    }

    #[tokio::test]
    async fn second_sweep_is_a_no_op() {
        let db = DbService::in_memory().await.unwrap();
        seed(&db.pool).await;
        insert_delivered_order(&db.pool, 100, 8 * MILLIS_PER_DAY).await;

        let sweeper = sweeper(&db.pool);
        sweeper.run_once().await.unwrap();
        let report = sweeper.run_once().await.unwrap();
        assert_eq!(report.eligible, 0);
        assert_eq!(report.completed, 0);

        // No double accrual either
        let (points,): (i64,) = sqlx::query_as("SELECT points_balance FROM users WHERE id = 1")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(points, 25);
    }

    #[tokio::test]
    async fn grace_window_is_runtime_configurable() {
        let db = DbService::in_memory().await.unwrap();
        seed(&db.pool).await;
        insert_delivered_order(&db.pool, 100, 3 * MILLIS_PER_DAY).await;

        let settings = SettingsService::new(db.pool.clone());
        settings
            .set(keys::AUTO_COMPLETE_GRACE_DAYS, SettingValue::Number(2.0))
            .await
            .unwrap();

        let report = sweeper(&db.pool).run_once().await.unwrap();
        assert_eq!(report.completed, 1);
    }

    #[tokio::test]
    async fn sweeps_multiple_orders_in_one_batch() {
        let db = DbService::in_memory().await.unwrap();
        seed(&db.pool).await;
        for (id, days) in [(100, 8), (101, 9), (102, 30)] {
            insert_delivered_order(&db.pool, id, days * MILLIS_PER_DAY).await;
        }

        let report = sweeper(&db.pool).run_once().await.unwrap();
        assert_eq!(report.eligible, 3);
        assert_eq!(report.completed, 3);

        // Each order earned exactly once
        let earns: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM point_transactions WHERE kind = 'earn_purchase'",
        )
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(earns, 3);
    }
}
