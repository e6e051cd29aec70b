//! Stock Ledger
//!
//! 库存台账：预留、释放、出库、盘点调整与仓库调拨。
//! 这里是“这张订单能不能发货”的唯一事实来源。
//!
//! 预留协议：`quantity - reserved >= n` 的检查与 `reserved += n` 在同一条
//! 条件 UPDATE 内完成，两个并发预留不可能同时吃掉最后一件库存。

use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;

use crate::db::repository::{product, stock, RepoError};
use crate::settings::{self, defaults, keys};
use shared::models::{StockAlert, VariantStock};

#[derive(Debug, Error)]
pub enum StockError {
    #[error("Insufficient stock for variant {variant_id} in warehouse {warehouse_id}: requested {requested}, available {available}")]
    Insufficient {
        variant_id: i64,
        warehouse_id: i64,
        requested: i64,
        available: i64,
    },

    #[error("Stock record not found for variant {variant_id} in warehouse {warehouse_id}")]
    NotFound { variant_id: i64, warehouse_id: i64 },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<RepoError> for StockError {
    fn from(e: RepoError) -> Self {
        StockError::Storage(e.to_string())
    }
}

impl From<sqlx::Error> for StockError {
    fn from(e: sqlx::Error) -> Self {
        StockError::Storage(e.to_string())
    }
}

impl From<StockError> for crate::utils::AppError {
    fn from(e: StockError) -> Self {
        match e {
            StockError::Insufficient { .. } => crate::utils::AppError::InsufficientStock(e.to_string()),
            StockError::NotFound { .. } => crate::utils::AppError::NotFound(e.to_string()),
            StockError::InvalidQuantity(_) => crate::utils::AppError::Validation(e.to_string()),
            StockError::Storage(msg) => crate::utils::AppError::Database(msg),
        }
    }
}

/// Stock ledger service. Pool-level methods run in their own transaction;
/// the `*_in` functions join a caller's transaction (order placement,
/// cancellation).
#[derive(Clone)]
pub struct StockLedger {
    pool: SqlitePool,
}

impl StockLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Soft-hold `quantity` units for an order.
    pub async fn reserve(
        &self,
        variant_id: i64,
        warehouse_id: i64,
        quantity: i64,
    ) -> Result<VariantStock, StockError> {
        let mut tx = self.pool.begin().await?;
        let stock = reserve_in(&mut tx, variant_id, warehouse_id, quantity).await?;
        tx.commit().await?;
        Ok(stock)
    }

    /// Release a reservation (cancellation path). Quantity is unchanged.
    pub async fn release(
        &self,
        variant_id: i64,
        warehouse_id: i64,
        quantity: i64,
    ) -> Result<VariantStock, StockError> {
        let mut tx = self.pool.begin().await?;
        let stock = release_in(&mut tx, variant_id, warehouse_id, quantity).await?;
        tx.commit().await?;
        Ok(stock)
    }

    /// Ship reserved units out: quantity and reserved drop together.
    pub async fn commit_sale(
        &self,
        variant_id: i64,
        warehouse_id: i64,
        quantity: i64,
    ) -> Result<VariantStock, StockError> {
        let mut tx = self.pool.begin().await?;
        let stock = commit_sale_in(&mut tx, variant_id, warehouse_id, quantity).await?;
        tx.commit().await?;
        Ok(stock)
    }

    /// Direct quantity adjustment (restock, damage, correction), always
    /// with an audit row.
    pub async fn adjust(
        &self,
        variant_id: i64,
        warehouse_id: i64,
        delta: i64,
        reason: &str,
        actor_id: i64,
    ) -> Result<VariantStock, StockError> {
        let mut tx = self.pool.begin().await?;
        let stock = adjust_in(&mut tx, variant_id, warehouse_id, delta, reason, actor_id).await?;
        tx.commit().await?;
        Ok(stock)
    }

    /// Move units between warehouses: both adjusts commit or neither does.
    pub async fn transfer(
        &self,
        from_warehouse: i64,
        to_warehouse: i64,
        variant_id: i64,
        quantity: i64,
        actor_id: i64,
    ) -> Result<(), StockError> {
        if quantity <= 0 {
            return Err(StockError::InvalidQuantity(quantity));
        }
        let mut tx = self.pool.begin().await?;
        adjust_in(&mut tx, variant_id, from_warehouse, -quantity, "transfer_out", actor_id).await?;
        adjust_in(&mut tx, variant_id, to_warehouse, quantity, "transfer_in", actor_id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn stock_of(
        &self,
        variant_id: i64,
        warehouse_id: i64,
    ) -> Result<Option<VariantStock>, StockError> {
        Ok(stock::get(&self.pool, variant_id, warehouse_id).await?)
    }

    pub async fn alerts(&self, status: Option<&str>) -> Result<Vec<StockAlert>, StockError> {
        Ok(stock::list_alerts(&self.pool, status).await?)
    }

    pub async fn resolve_alert(&self, alert_id: i64) -> Result<bool, StockError> {
        Ok(stock::resolve_alert(&self.pool, alert_id).await?)
    }
}

/// Reserve inside an existing transaction.
pub async fn reserve_in(
    conn: &mut SqliteConnection,
    variant_id: i64,
    warehouse_id: i64,
    quantity: i64,
) -> Result<VariantStock, StockError> {
    if quantity <= 0 {
        return Err(StockError::InvalidQuantity(quantity));
    }

    if !stock::try_reserve(conn, variant_id, warehouse_id, quantity).await? {
        // Distinguish a missing row from a short one
        return match stock::get(&mut *conn, variant_id, warehouse_id).await? {
            None => Err(StockError::NotFound { variant_id, warehouse_id }),
            Some(row) => Err(StockError::Insufficient {
                variant_id,
                warehouse_id,
                requested: quantity,
                available: row.available(),
            }),
        };
    }

    let stock = current(conn, variant_id, warehouse_id).await?;
    maybe_raise_low_stock(conn, &stock).await?;
    Ok(stock)
}

/// Release inside an existing transaction.
pub async fn release_in(
    conn: &mut SqliteConnection,
    variant_id: i64,
    warehouse_id: i64,
    quantity: i64,
) -> Result<VariantStock, StockError> {
    if quantity <= 0 {
        return Err(StockError::InvalidQuantity(quantity));
    }
    stock::release(conn, variant_id, warehouse_id, quantity).await?;
    current(conn, variant_id, warehouse_id).await
}

/// Commit a sale inside an existing transaction (shipment path).
pub async fn commit_sale_in(
    conn: &mut SqliteConnection,
    variant_id: i64,
    warehouse_id: i64,
    quantity: i64,
) -> Result<VariantStock, StockError> {
    if quantity <= 0 {
        return Err(StockError::InvalidQuantity(quantity));
    }

    if !stock::try_commit_sale(conn, variant_id, warehouse_id, quantity).await? {
        return match stock::get(&mut *conn, variant_id, warehouse_id).await? {
            None => Err(StockError::NotFound { variant_id, warehouse_id }),
            Some(row) => Err(StockError::Insufficient {
                variant_id,
                warehouse_id,
                requested: quantity,
                available: row.reserved.min(row.quantity),
            }),
        };
    }

    let stock_row = current(conn, variant_id, warehouse_id).await?;
    stock::insert_inventory_tx(
        conn,
        variant_id,
        warehouse_id,
        -quantity,
        stock_row.quantity,
        "sale",
        shared::SYSTEM_ACTOR,
    )
    .await?;
    maybe_raise_low_stock(conn, &stock_row).await?;
    Ok(stock_row)
}

async fn adjust_in(
    conn: &mut SqliteConnection,
    variant_id: i64,
    warehouse_id: i64,
    delta: i64,
    reason: &str,
    actor_id: i64,
) -> Result<VariantStock, StockError> {
    if delta == 0 {
        return Err(StockError::InvalidQuantity(0));
    }

    stock::ensure_row(conn, variant_id, warehouse_id).await?;

    if !stock::try_apply_delta(conn, variant_id, warehouse_id, delta).await? {
        let row = stock::get(&mut *conn, variant_id, warehouse_id)
            .await?
            .ok_or(StockError::NotFound { variant_id, warehouse_id })?;
        return Err(StockError::Insufficient {
            variant_id,
            warehouse_id,
            requested: -delta,
            available: row.quantity,
        });
    }

    let stock_row = current(conn, variant_id, warehouse_id).await?;
    stock::insert_inventory_tx(
        conn,
        variant_id,
        warehouse_id,
        delta,
        stock_row.quantity,
        reason,
        actor_id,
    )
    .await?;
    if delta < 0 {
        maybe_raise_low_stock(conn, &stock_row).await?;
    }
    Ok(stock_row)
}

async fn current(
    conn: &mut SqliteConnection,
    variant_id: i64,
    warehouse_id: i64,
) -> Result<VariantStock, StockError> {
    stock::get(&mut *conn, variant_id, warehouse_id)
        .await?
        .ok_or(StockError::NotFound { variant_id, warehouse_id })
}

/// Raise a low-stock alert when available crosses below the effective
/// threshold. Skipped while an open alert exists for the variant.
async fn maybe_raise_low_stock(
    conn: &mut SqliteConnection,
    stock_row: &VariantStock,
) -> Result<(), StockError> {
    let threshold = effective_threshold(conn, stock_row.variant_id).await?;
    if stock_row.available() >= threshold {
        return Ok(());
    }
    if stock::open_alert_exists(conn, stock_row.variant_id).await? {
        return Ok(());
    }

    stock::insert_alert(
        conn,
        stock_row.variant_id,
        stock_row.warehouse_id,
        stock_row.available(),
        threshold,
    )
    .await?;
    tracing::warn!(
        variant_id = stock_row.variant_id,
        warehouse_id = stock_row.warehouse_id,
        available = stock_row.available(),
        threshold,
        "low stock alert raised"
    );
    Ok(())
}

/// Per-variant threshold override, else the runtime setting, else the
/// built-in default.
async fn effective_threshold(conn: &mut SqliteConnection, variant_id: i64) -> Result<i64, StockError> {
    if let Some(variant) = product::find_variant(&mut *conn, variant_id).await? {
        if let Some(threshold) = variant.low_stock_threshold {
            return Ok(threshold);
        }
    }
    let setting = settings::get_with(&mut *conn, keys::LOW_STOCK_THRESHOLD).await?;
    Ok(setting
        .and_then(|v| v.as_i64())
        .unwrap_or(defaults::LOW_STOCK_THRESHOLD))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;

    async fn seed(pool: &SqlitePool, quantity: i64) -> (i64, i64) {
        let now = shared::util::now_millis();
        sqlx::query("INSERT INTO products (id, name, created_at, updated_at) VALUES (1, 'Shirt', ?1, ?1)")
            .bind(now)
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO product_variants (id, product_id, sku, name, price, created_at, updated_at) \
             VALUES (10, 1, 'SHIRT-M', 'Shirt M', 150000, ?1, ?1)",
        )
        .bind(now)
        .execute(pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO warehouses (id, code, name, created_at, updated_at) VALUES (20, 'HCM', 'Saigon', ?1, ?1)")
            .bind(now)
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO variant_stock (id, variant_id, warehouse_id, quantity, reserved, updated_at) \
             VALUES (30, 10, 20, ?1, 0, ?2)",
        )
        .bind(quantity)
        .bind(now)
        .execute(pool)
        .await
        .unwrap();
        (10, 20)
    }

    #[tokio::test]
    async fn reserve_holds_stock_without_removing_it() {
        let db = DbService::in_memory().await.unwrap();
        let (variant, wh) = seed(&db.pool, 10).await;
        let ledger = StockLedger::new(db.pool.clone());

        let stock = ledger.reserve(variant, wh, 2).await.unwrap();
        assert_eq!(stock.quantity, 10);
        assert_eq!(stock.reserved, 2);
        assert_eq!(stock.available(), 8);
    }

    #[tokio::test]
    async fn reserve_rejects_when_short() {
        let db = DbService::in_memory().await.unwrap();
        let (variant, wh) = seed(&db.pool, 5).await;
        let ledger = StockLedger::new(db.pool.clone());

        ledger.reserve(variant, wh, 3).await.unwrap();
        let err = ledger.reserve(variant, wh, 3).await.unwrap_err();
        match err {
            StockError::Insufficient { available, requested, .. } => {
                assert_eq!(available, 2);
                assert_eq!(requested, 3);
            }
            other => panic!("expected Insufficient, got {other:?}"),
        }
        // Reserved never exceeds quantity
        let stock = ledger.stock_of(variant, wh).await.unwrap().unwrap();
        assert!(stock.reserved <= stock.quantity);
    }

    #[tokio::test]
    async fn concurrent_reserves_grant_only_one() {
        let db = DbService::in_memory().await.unwrap();
        let (variant, wh) = seed(&db.pool, 5).await;
        let ledger = StockLedger::new(db.pool.clone());

        let (a, b) = tokio::join!(ledger.reserve(variant, wh, 3), ledger.reserve(variant, wh, 3));
        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one of two racing reserves may win");
        assert!(
            [&a, &b]
                .iter()
                .any(|r| matches!(r, Err(StockError::Insufficient { .. }))),
            "the loser must fail with Insufficient"
        );

        let stock = ledger.stock_of(variant, wh).await.unwrap().unwrap();
        assert_eq!(stock.reserved, 3);
        assert!(stock.reserved <= stock.quantity);
    }

    #[tokio::test]
    async fn release_floors_at_zero() {
        let db = DbService::in_memory().await.unwrap();
        let (variant, wh) = seed(&db.pool, 5).await;
        let ledger = StockLedger::new(db.pool.clone());

        ledger.reserve(variant, wh, 2).await.unwrap();
        let stock = ledger.release(variant, wh, 4).await.unwrap();
        assert_eq!(stock.reserved, 0);
        assert_eq!(stock.quantity, 5);
    }

    #[tokio::test]
    async fn commit_sale_deducts_both_counters() {
        let db = DbService::in_memory().await.unwrap();
        let (variant, wh) = seed(&db.pool, 10).await;
        let ledger = StockLedger::new(db.pool.clone());

        ledger.reserve(variant, wh, 4).await.unwrap();
        let stock = ledger.commit_sale(variant, wh, 4).await.unwrap();
        assert_eq!(stock.quantity, 6);
        assert_eq!(stock.reserved, 0);

        // Audit row written
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM inventory_transactions WHERE variant_id = ? AND reason = 'sale'",
        )
        .bind(variant)
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn adjust_writes_audit_row_with_balance() {
        let db = DbService::in_memory().await.unwrap();
        let (variant, wh) = seed(&db.pool, 10).await;
        let ledger = StockLedger::new(db.pool.clone());

        let stock = ledger.adjust(variant, wh, -3, "damage", 99).await.unwrap();
        assert_eq!(stock.quantity, 7);

        let (delta, balance): (i64, i64) = sqlx::query_as(
            "SELECT delta, balance_after FROM inventory_transactions WHERE variant_id = ?",
        )
        .bind(variant)
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(delta, -3);
        assert_eq!(balance, 7);
    }

    #[tokio::test]
    async fn adjust_refuses_negative_quantity() {
        let db = DbService::in_memory().await.unwrap();
        let (variant, wh) = seed(&db.pool, 2).await;
        let ledger = StockLedger::new(db.pool.clone());

        assert!(matches!(
            ledger.adjust(variant, wh, -5, "damage", 99).await,
            Err(StockError::Insufficient { .. })
        ));
        let stock = ledger.stock_of(variant, wh).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 2);
    }

    #[tokio::test]
    async fn transfer_is_all_or_nothing() {
        let db = DbService::in_memory().await.unwrap();
        let (variant, wh) = seed(&db.pool, 10).await;
        let now = shared::util::now_millis();
        sqlx::query("INSERT INTO warehouses (id, code, name, created_at, updated_at) VALUES (21, 'HN', 'Hanoi', ?1, ?1)")
            .bind(now)
            .execute(&db.pool)
            .await
            .unwrap();
        let ledger = StockLedger::new(db.pool.clone());

        ledger.transfer(wh, 21, variant, 4, 99).await.unwrap();
        assert_eq!(ledger.stock_of(variant, wh).await.unwrap().unwrap().quantity, 6);
        assert_eq!(ledger.stock_of(variant, 21).await.unwrap().unwrap().quantity, 4);

        // Source short: nothing moves
        let err = ledger.transfer(wh, 21, variant, 100, 99).await;
        assert!(err.is_err());
        assert_eq!(ledger.stock_of(variant, wh).await.unwrap().unwrap().quantity, 6);
        assert_eq!(ledger.stock_of(variant, 21).await.unwrap().unwrap().quantity, 4);
    }

    #[tokio::test]
    async fn low_stock_alert_raised_once() {
        let db = DbService::in_memory().await.unwrap();
        let (variant, wh) = seed(&db.pool, 10).await;
        let ledger = StockLedger::new(db.pool.clone());

        // Default threshold is 5: dropping available to 4 raises one alert
        ledger.reserve(variant, wh, 6).await.unwrap();
        let alerts = ledger.alerts(Some("open")).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].available, 4);

        // Further drops do not re-raise while the alert is open
        ledger.reserve(variant, wh, 2).await.unwrap();
        assert_eq!(ledger.alerts(Some("open")).await.unwrap().len(), 1);

        // After resolving, a new crossing raises again
        ledger.resolve_alert(alerts[0].id).await.unwrap();
        ledger.reserve(variant, wh, 1).await.unwrap();
        assert_eq!(ledger.alerts(Some("open")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn variant_threshold_overrides_default() {
        let db = DbService::in_memory().await.unwrap();
        let (variant, wh) = seed(&db.pool, 10).await;
        sqlx::query("UPDATE product_variants SET low_stock_threshold = 1 WHERE id = ?")
            .bind(variant)
            .execute(&db.pool)
            .await
            .unwrap();
        let ledger = StockLedger::new(db.pool.clone());

        // Available 4 is above the per-variant threshold of 1: no alert
        ledger.reserve(variant, wh, 6).await.unwrap();
        assert!(ledger.alerts(Some("open")).await.unwrap().is_empty());
    }
}
