//! Loyalty Repository
//!
//! 积分流水与余额。earn_purchase 的幂等性由
//! `idx_point_tx_earn_once` 唯一索引保证。

use super::{RepoError, RepoResult};
use shared::models::{PointTransaction, PointTransactionKind};
use sqlx::{Sqlite, SqliteConnection};

const TX_SELECT: &str =
    "SELECT id, user_id, kind, points, order_id, note, created_at FROM point_transactions";

/// Insert the one-and-only earning entry for an order.
///
/// Returns `Ok(false)` when the order was already credited (unique index
/// hit) — the caller treats that as a successful no-op.
pub async fn try_insert_earn(
    conn: &mut SqliteConnection,
    user_id: i64,
    order_id: i64,
    points: i64,
) -> RepoResult<bool> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    let result = sqlx::query(
        "INSERT INTO point_transactions (id, user_id, kind, points, order_id, created_at) \
         VALUES (?1, ?2, 'earn_purchase', ?3, ?4, ?5)",
    )
    .bind(id)
    .bind(user_id)
    .bind(points)
    .bind(order_id)
    .bind(now)
    .execute(conn)
    .await;

    match result {
        Ok(_) => Ok(true),
        Err(e) => match RepoError::from(e) {
            RepoError::Duplicate(_) => Ok(false),
            other => Err(other),
        },
    }
}

/// Append a non-earning ledger entry (redeem/adjust/expire).
pub async fn insert_entry(
    conn: &mut SqliteConnection,
    user_id: i64,
    kind: PointTransactionKind,
    points: i64,
    note: Option<&str>,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO point_transactions (id, user_id, kind, points, note, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(id)
    .bind(user_id)
    .bind(kind)
    .bind(points)
    .bind(note)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Unconditional balance credit (earning path — points are always positive).
pub async fn add_points(conn: &mut SqliteConnection, user_id: i64, points: i64) -> RepoResult<()> {
    let now = shared::util::now_millis();
    sqlx::query("UPDATE users SET points_balance = points_balance + ?1, updated_at = ?2 WHERE id = ?3")
        .bind(points)
        .bind(now)
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Conditional balance debit: fails (returns false) when the balance is
/// short, in the same statement that decrements it.
pub async fn try_spend_points(
    conn: &mut SqliteConnection,
    user_id: i64,
    points: i64,
) -> RepoResult<bool> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE users SET points_balance = points_balance - ?1, updated_at = ?2 \
         WHERE id = ?3 AND points_balance >= ?1",
    )
    .bind(points)
    .bind(now)
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(rows.rows_affected() == 1)
}

pub async fn balance<'e, E>(ex: E, user_id: i64) -> RepoResult<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let balance: Option<i64> = sqlx::query_scalar("SELECT points_balance FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(ex)
        .await?;
    balance.ok_or_else(|| RepoError::NotFound(format!("User {user_id} not found")))
}

pub async fn history<'e, E>(ex: E, user_id: i64) -> RepoResult<Vec<PointTransaction>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{TX_SELECT} WHERE user_id = ? ORDER BY created_at DESC, id DESC");
    let rows = sqlx::query_as::<_, PointTransaction>(&sql)
        .bind(user_id)
        .fetch_all(ex)
        .await?;
    Ok(rows)
}

/// The earning entry for an order, if any.
pub async fn earn_entry_for_order<'e, E>(
    ex: E,
    order_id: i64,
) -> RepoResult<Option<PointTransaction>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{TX_SELECT} WHERE order_id = ? AND kind = 'earn_purchase'");
    let row = sqlx::query_as::<_, PointTransaction>(&sql)
        .bind(order_id)
        .fetch_optional(ex)
        .await?;
    Ok(row)
}
