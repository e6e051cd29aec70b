//! Warehouse Repository

use super::{RepoError, RepoResult};
use shared::models::{Warehouse, WarehouseCreate};
use sqlx::SqlitePool;

const WAREHOUSE_SELECT: &str =
    "SELECT id, code, name, is_active, created_at, updated_at FROM warehouses";

pub async fn find_all(pool: &SqlitePool) -> RepoResult<Vec<Warehouse>> {
    let sql = format!("{WAREHOUSE_SELECT} WHERE is_active = 1 ORDER BY code");
    let rows = sqlx::query_as::<_, Warehouse>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Warehouse>> {
    let sql = format!("{WAREHOUSE_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Warehouse>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn create(pool: &SqlitePool, data: WarehouseCreate) -> RepoResult<Warehouse> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO warehouses (id, code, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
    )
    .bind(id)
    .bind(data.code)
    .bind(data.name)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create warehouse".into()))
}

pub async fn soft_delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE warehouses SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}
