//! Stock Repository
//!
//! 库存计数器的原子操作。所有会改变 quantity/reserved 的语句都是
//! 条件更新（check-and-increment 在同一条 UPDATE 内完成），
//! 并发调用方靠行级锁串行化，应用层不做 read-then-write。

use super::RepoResult;
use shared::models::{InventoryTransaction, StockAlert, VariantStock};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

const STOCK_SELECT: &str =
    "SELECT id, variant_id, warehouse_id, quantity, reserved, updated_at FROM variant_stock";

const ALERT_SELECT: &str = "SELECT id, variant_id, warehouse_id, available, threshold, status, \
     created_at, resolved_at FROM stock_alerts";

pub async fn get<'e, E>(ex: E, variant_id: i64, warehouse_id: i64) -> RepoResult<Option<VariantStock>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{STOCK_SELECT} WHERE variant_id = ? AND warehouse_id = ?");
    let row = sqlx::query_as::<_, VariantStock>(&sql)
        .bind(variant_id)
        .bind(warehouse_id)
        .fetch_optional(ex)
        .await?;
    Ok(row)
}

pub async fn list_by_variant(pool: &SqlitePool, variant_id: i64) -> RepoResult<Vec<VariantStock>> {
    let sql = format!("{STOCK_SELECT} WHERE variant_id = ?");
    let rows = sqlx::query_as::<_, VariantStock>(&sql)
        .bind(variant_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Create the counter row if absent (quantity 0, reserved 0).
pub async fn ensure_row(
    conn: &mut SqliteConnection,
    variant_id: i64,
    warehouse_id: i64,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT OR IGNORE INTO variant_stock (id, variant_id, warehouse_id, quantity, reserved, updated_at) \
         VALUES (?1, ?2, ?3, 0, 0, ?4)",
    )
    .bind(id)
    .bind(variant_id)
    .bind(warehouse_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Atomic check-and-increment of `reserved`.
///
/// Returns `false` when the row is missing or availability is short —
/// the caller decides which it was.
pub async fn try_reserve(
    conn: &mut SqliteConnection,
    variant_id: i64,
    warehouse_id: i64,
    quantity: i64,
) -> RepoResult<bool> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE variant_stock SET reserved = reserved + ?1, updated_at = ?2 \
         WHERE variant_id = ?3 AND warehouse_id = ?4 AND quantity - reserved >= ?1",
    )
    .bind(quantity)
    .bind(now)
    .bind(variant_id)
    .bind(warehouse_id)
    .execute(conn)
    .await?;
    Ok(rows.rows_affected() == 1)
}

/// Release a reservation, floored at zero. Quantity is untouched.
pub async fn release(
    conn: &mut SqliteConnection,
    variant_id: i64,
    warehouse_id: i64,
    quantity: i64,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    sqlx::query(
        "UPDATE variant_stock SET reserved = MAX(0, reserved - ?1), updated_at = ?2 \
         WHERE variant_id = ?3 AND warehouse_id = ?4",
    )
    .bind(quantity)
    .bind(now)
    .bind(variant_id)
    .bind(warehouse_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Convert a reservation into a physical deduction: quantity and reserved
/// both drop by the same amount.
pub async fn try_commit_sale(
    conn: &mut SqliteConnection,
    variant_id: i64,
    warehouse_id: i64,
    quantity: i64,
) -> RepoResult<bool> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE variant_stock SET quantity = quantity - ?1, reserved = reserved - ?1, updated_at = ?2 \
         WHERE variant_id = ?3 AND warehouse_id = ?4 AND reserved >= ?1 AND quantity >= ?1",
    )
    .bind(quantity)
    .bind(now)
    .bind(variant_id)
    .bind(warehouse_id)
    .execute(conn)
    .await?;
    Ok(rows.rows_affected() == 1)
}

/// Signed quantity adjustment; refuses to take quantity below zero.
pub async fn try_apply_delta(
    conn: &mut SqliteConnection,
    variant_id: i64,
    warehouse_id: i64,
    delta: i64,
) -> RepoResult<bool> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE variant_stock SET quantity = quantity + ?1, updated_at = ?2 \
         WHERE variant_id = ?3 AND warehouse_id = ?4 AND quantity + ?1 >= 0",
    )
    .bind(delta)
    .bind(now)
    .bind(variant_id)
    .bind(warehouse_id)
    .execute(conn)
    .await?;
    Ok(rows.rows_affected() == 1)
}

/// Append an audit row for a direct quantity change.
pub async fn insert_inventory_tx(
    conn: &mut SqliteConnection,
    variant_id: i64,
    warehouse_id: i64,
    delta: i64,
    balance_after: i64,
    reason: &str,
    actor_id: i64,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO inventory_transactions (id, variant_id, warehouse_id, delta, balance_after, \
         reason, actor_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(id)
    .bind(variant_id)
    .bind(warehouse_id)
    .bind(delta)
    .bind(balance_after)
    .bind(reason)
    .bind(actor_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Audit trail for a variant, newest first.
pub async fn list_inventory_tx(
    pool: &SqlitePool,
    variant_id: i64,
) -> RepoResult<Vec<InventoryTransaction>> {
    let rows = sqlx::query_as::<_, InventoryTransaction>(
        "SELECT id, variant_id, warehouse_id, delta, balance_after, reason, actor_id, created_at \
         FROM inventory_transactions WHERE variant_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(variant_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ========== Alerts ==========

pub async fn open_alert_exists(conn: &mut SqliteConnection, variant_id: i64) -> RepoResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM stock_alerts WHERE variant_id = ? AND status = 'open'",
    )
    .bind(variant_id)
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

pub async fn insert_alert(
    conn: &mut SqliteConnection,
    variant_id: i64,
    warehouse_id: i64,
    available: i64,
    threshold: i64,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO stock_alerts (id, variant_id, warehouse_id, available, threshold, status, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, 'open', ?6)",
    )
    .bind(id)
    .bind(variant_id)
    .bind(warehouse_id)
    .bind(available)
    .bind(threshold)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn list_alerts(pool: &SqlitePool, status: Option<&str>) -> RepoResult<Vec<StockAlert>> {
    let rows = match status {
        Some(status) => {
            let sql = format!("{ALERT_SELECT} WHERE status = ? ORDER BY created_at DESC");
            sqlx::query_as::<_, StockAlert>(&sql)
                .bind(status)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!("{ALERT_SELECT} ORDER BY created_at DESC");
            sqlx::query_as::<_, StockAlert>(&sql).fetch_all(pool).await?
        }
    };
    Ok(rows)
}

pub async fn resolve_alert(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE stock_alerts SET status = 'resolved', resolved_at = ? WHERE id = ? AND status = 'open'",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}
