//! Cart Repository

use super::{RepoError, RepoResult};
use shared::models::{Cart, CartItem};
use sqlx::{SqliteConnection, SqlitePool};

const CART_SELECT: &str = "SELECT id, user_id, status, created_at, updated_at FROM carts";

/// The user's open cart, created on first use.
pub async fn get_or_create_open(pool: &SqlitePool, user_id: i64) -> RepoResult<Cart> {
    let sql = format!("{CART_SELECT} WHERE user_id = ? AND status = 'open'");
    if let Some(cart) = sqlx::query_as::<_, Cart>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
    {
        return Ok(cart);
    }

    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    // A concurrent first-use may race us here; the partial unique index
    // keeps one open cart and INSERT OR IGNORE makes the loser re-read.
    sqlx::query(
        "INSERT OR IGNORE INTO carts (id, user_id, status, created_at, updated_at) \
         VALUES (?1, ?2, 'open', ?3, ?3)",
    )
    .bind(id)
    .bind(user_id)
    .bind(now)
    .execute(pool)
    .await?;

    sqlx::query_as::<_, Cart>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create cart".into()))
}

pub async fn items(pool: &SqlitePool, cart_id: i64) -> RepoResult<Vec<CartItem>> {
    let rows = sqlx::query_as::<_, CartItem>(
        "SELECT id, cart_id, variant_id, warehouse_id, quantity, created_at \
         FROM cart_items WHERE cart_id = ? ORDER BY created_at, id",
    )
    .bind(cart_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Add a line, merging quantities when the (variant, warehouse) pair is
/// already in the cart.
pub async fn upsert_item(
    pool: &SqlitePool,
    cart_id: i64,
    variant_id: i64,
    warehouse_id: i64,
    quantity: i64,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO cart_items (id, cart_id, variant_id, warehouse_id, quantity, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT (cart_id, variant_id, warehouse_id) \
         DO UPDATE SET quantity = quantity + excluded.quantity",
    )
    .bind(id)
    .bind(cart_id)
    .bind(variant_id)
    .bind(warehouse_id)
    .bind(quantity)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_item_quantity(
    pool: &SqlitePool,
    cart_id: i64,
    item_id: i64,
    quantity: i64,
) -> RepoResult<bool> {
    let rows = sqlx::query("UPDATE cart_items SET quantity = ?1 WHERE id = ?2 AND cart_id = ?3")
        .bind(quantity)
        .bind(item_id)
        .bind(cart_id)
        .execute(pool)
        .await?;
    Ok(rows.rows_affected() > 0)
}

pub async fn remove_item(pool: &SqlitePool, cart_id: i64, item_id: i64) -> RepoResult<bool> {
    let rows = sqlx::query("DELETE FROM cart_items WHERE id = ? AND cart_id = ?")
        .bind(item_id)
        .bind(cart_id)
        .execute(pool)
        .await?;
    Ok(rows.rows_affected() > 0)
}

pub async fn clear(pool: &SqlitePool, cart_id: i64) -> RepoResult<()> {
    sqlx::query("DELETE FROM cart_items WHERE cart_id = ?")
        .bind(cart_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Close the cart after checkout; the next add opens a fresh one.
pub async fn close(conn: &mut SqliteConnection, cart_id: i64) -> RepoResult<()> {
    let now = shared::util::now_millis();
    sqlx::query("UPDATE carts SET status = 'converted', updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(cart_id)
        .execute(conn)
        .await?;
    Ok(())
}
