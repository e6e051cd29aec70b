//! Order Repository
//!
//! 订单行、订单项与状态历史的持久化。状态更新与历史写入由
//! 生命周期管理器在同一事务内调用。

use super::{RepoError, RepoResult};
use shared::models::{Order, OrderItem, OrderStatus, OrderStatusHistory};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

const ORDER_SELECT: &str = "SELECT id, order_number, user_id, status, total_amount, currency, \
     payment_method_id, note, placed_at, delivered_at, completed_at, created_at, updated_at \
     FROM orders";

pub async fn find_by_id<'e, E>(ex: E, id: i64) -> RepoResult<Option<Order>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{ORDER_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Order>(&sql).bind(id).fetch_optional(ex).await?;
    Ok(row)
}

pub async fn find_by_number(pool: &SqlitePool, order_number: &str) -> RepoResult<Option<Order>> {
    let sql = format!("{ORDER_SELECT} WHERE order_number = ?");
    let row = sqlx::query_as::<_, Order>(&sql)
        .bind(order_number)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_by_user(pool: &SqlitePool, user_id: i64) -> RepoResult<Vec<Order>> {
    let sql = format!("{ORDER_SELECT} WHERE user_id = ? ORDER BY placed_at DESC");
    let rows = sqlx::query_as::<_, Order>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn list_all(pool: &SqlitePool, limit: i64) -> RepoResult<Vec<Order>> {
    let sql = format!("{ORDER_SELECT} ORDER BY placed_at DESC LIMIT ?");
    let rows = sqlx::query_as::<_, Order>(&sql).bind(limit).fetch_all(pool).await?;
    Ok(rows)
}

/// Delivered orders whose grace window has elapsed. Sweeper input.
pub async fn delivered_before(
    conn: &mut SqliteConnection,
    cutoff_millis: i64,
) -> RepoResult<Vec<Order>> {
    let sql = format!(
        "{ORDER_SELECT} WHERE status = 'delivered' AND delivered_at IS NOT NULL \
         AND delivered_at <= ? ORDER BY delivered_at"
    );
    let rows = sqlx::query_as::<_, Order>(&sql)
        .bind(cutoff_millis)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

pub async fn insert(conn: &mut SqliteConnection, order: &Order) -> RepoResult<()> {
    sqlx::query(
        "INSERT INTO orders (id, order_number, user_id, status, total_amount, currency, \
         payment_method_id, note, placed_at, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )
    .bind(order.id)
    .bind(&order.order_number)
    .bind(order.user_id)
    .bind(order.status)
    .bind(order.total_amount)
    .bind(&order.currency)
    .bind(order.payment_method_id)
    .bind(&order.note)
    .bind(order.placed_at)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn insert_item(conn: &mut SqliteConnection, item: &OrderItem) -> RepoResult<()> {
    sqlx::query(
        "INSERT INTO order_items (id, order_id, variant_id, warehouse_id, quantity, unit_price) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(item.id)
    .bind(item.order_id)
    .bind(item.variant_id)
    .bind(item.warehouse_id)
    .bind(item.quantity)
    .bind(item.unit_price)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn items_by_order<'e, E>(ex: E, order_id: i64) -> RepoResult<Vec<OrderItem>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, OrderItem>(
        "SELECT id, order_id, variant_id, warehouse_id, quantity, unit_price \
         FROM order_items WHERE order_id = ?",
    )
    .bind(order_id)
    .fetch_all(ex)
    .await?;
    Ok(rows)
}

/// Apply a status change. `delivered_at`/`completed_at` only ever move from
/// NULL to a value (COALESCE keeps the first write).
pub async fn update_status(
    conn: &mut SqliteConnection,
    order_id: i64,
    new_status: OrderStatus,
    delivered_at: Option<i64>,
    completed_at: Option<i64>,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE orders SET status = ?1, delivered_at = COALESCE(delivered_at, ?2), \
         completed_at = COALESCE(completed_at, ?3), updated_at = ?4 WHERE id = ?5",
    )
    .bind(new_status)
    .bind(delivered_at)
    .bind(completed_at)
    .bind(now)
    .bind(order_id)
    .execute(conn)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Order {order_id} not found")));
    }
    Ok(())
}

/// Append one history row. Never updated, never deleted.
pub async fn insert_history(
    conn: &mut SqliteConnection,
    order_id: i64,
    old_status: OrderStatus,
    new_status: OrderStatus,
    actor_id: i64,
    comment: Option<&str>,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO order_status_history (id, order_id, old_status, new_status, actor_id, \
         comment, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(id)
    .bind(order_id)
    .bind(old_status)
    .bind(new_status)
    .bind(actor_id)
    .bind(comment)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn history_by_order<'e, E>(ex: E, order_id: i64) -> RepoResult<Vec<OrderStatusHistory>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, OrderStatusHistory>(
        "SELECT id, order_id, old_status, new_status, actor_id, comment, created_at \
         FROM order_status_history WHERE order_id = ? ORDER BY created_at, id",
    )
    .bind(order_id)
    .fetch_all(ex)
    .await?;
    Ok(rows)
}
