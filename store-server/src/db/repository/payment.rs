//! Payment Repository

use super::{RepoError, RepoResult};
use shared::models::{PaymentMethod, PaymentMethodCreate, PaymentTransaction};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

const METHOD_SELECT: &str =
    "SELECT id, code, name, is_gateway, is_active, created_at, updated_at FROM payment_methods";

const TX_SELECT: &str = "SELECT id, transaction_code, order_id, payment_method_id, gateway_txn_id, \
     status, amount, paid_at, metadata, created_at FROM payment_transactions";

// ========== Payment methods ==========

pub async fn find_methods(pool: &SqlitePool) -> RepoResult<Vec<PaymentMethod>> {
    let sql = format!("{METHOD_SELECT} WHERE is_active = 1 ORDER BY code");
    let rows = sqlx::query_as::<_, PaymentMethod>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

pub async fn find_method_by_id<'e, E>(ex: E, id: i64) -> RepoResult<Option<PaymentMethod>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{METHOD_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, PaymentMethod>(&sql)
        .bind(id)
        .fetch_optional(ex)
        .await?;
    Ok(row)
}

pub async fn create_method(pool: &SqlitePool, data: PaymentMethodCreate) -> RepoResult<PaymentMethod> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO payment_methods (id, code, name, is_gateway, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
    )
    .bind(id)
    .bind(data.code)
    .bind(data.name)
    .bind(data.is_gateway)
    .bind(now)
    .execute(pool)
    .await?;
    find_method_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create payment method".into()))
}

// ========== Transactions ==========

pub async fn find_by_code<'e, E>(ex: E, code: &str) -> RepoResult<Option<PaymentTransaction>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{TX_SELECT} WHERE transaction_code = ?");
    let row = sqlx::query_as::<_, PaymentTransaction>(&sql)
        .bind(code)
        .fetch_optional(ex)
        .await?;
    Ok(row)
}

pub async fn list_by_order<'e, E>(ex: E, order_id: i64) -> RepoResult<Vec<PaymentTransaction>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{TX_SELECT} WHERE order_id = ? ORDER BY created_at");
    let rows = sqlx::query_as::<_, PaymentTransaction>(&sql)
        .bind(order_id)
        .fetch_all(ex)
        .await?;
    Ok(rows)
}

/// Insert a pending transaction. The unique code was generated before any
/// gateway call; the amount is immutable from here on.
pub async fn create_transaction(
    pool: &SqlitePool,
    transaction_code: &str,
    order_id: i64,
    payment_method_id: i64,
    amount: f64,
) -> RepoResult<PaymentTransaction> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO payment_transactions (id, transaction_code, order_id, payment_method_id, \
         status, amount, created_at) VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6)",
    )
    .bind(id)
    .bind(transaction_code)
    .bind(order_id)
    .bind(payment_method_id)
    .bind(amount)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_code(pool, transaction_code)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create payment transaction".into()))
}

/// Attach the gateway's own transaction id and metadata once the intent
/// has been created remotely.
pub async fn attach_gateway_ref(
    pool: &SqlitePool,
    transaction_code: &str,
    gateway_txn_id: &str,
    metadata: Option<&str>,
) -> RepoResult<()> {
    sqlx::query(
        "UPDATE payment_transactions SET gateway_txn_id = ?1, metadata = COALESCE(?2, metadata) \
         WHERE transaction_code = ?3",
    )
    .bind(gateway_txn_id)
    .bind(metadata)
    .bind(transaction_code)
    .execute(pool)
    .await?;
    Ok(())
}

/// Flip pending -> paid, setting `paid_at` once. The partial unique index
/// on (order_id) WHERE status='paid' rejects a second paid row per order.
pub async fn try_mark_paid(
    conn: &mut SqliteConnection,
    transaction_code: &str,
    gateway_txn_id: Option<&str>,
) -> RepoResult<bool> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE payment_transactions SET status = 'paid', paid_at = ?1, \
         gateway_txn_id = COALESCE(?2, gateway_txn_id) \
         WHERE transaction_code = ?3 AND status = 'pending'",
    )
    .bind(now)
    .bind(gateway_txn_id)
    .bind(transaction_code)
    .execute(conn)
    .await?;
    Ok(rows.rows_affected() == 1)
}

pub async fn mark_failed(conn: &mut SqliteConnection, transaction_code: &str) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE payment_transactions SET status = 'failed' \
         WHERE transaction_code = ? AND status = 'pending'",
    )
    .bind(transaction_code)
    .execute(conn)
    .await?;
    Ok(rows.rows_affected() == 1)
}

/// Mark the order's paid transaction refunded (used by the refund override).
pub async fn mark_refunded(conn: &mut SqliteConnection, order_id: i64) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE payment_transactions SET status = 'refunded' \
         WHERE order_id = ? AND status = 'paid'",
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(rows.rows_affected() == 1)
}
