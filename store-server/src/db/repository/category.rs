//! Category Repository

use super::{RepoError, RepoResult};
use shared::models::{Category, CategoryCreate, CategoryUpdate};
use sqlx::SqlitePool;

const CATEGORY_SELECT: &str =
    "SELECT id, name, parent_id, sort_order, is_active, created_at, updated_at FROM categories";

pub async fn find_all(pool: &SqlitePool) -> RepoResult<Vec<Category>> {
    let sql = format!("{CATEGORY_SELECT} WHERE is_active = 1 ORDER BY sort_order, id");
    let rows = sqlx::query_as::<_, Category>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Category>> {
    let sql = format!("{CATEGORY_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Category>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Children of a node, derived by indexed query (the stored direction is
/// child -> parent only).
pub async fn find_children(pool: &SqlitePool, parent_id: i64) -> RepoResult<Vec<Category>> {
    let sql = format!("{CATEGORY_SELECT} WHERE parent_id = ? AND is_active = 1 ORDER BY sort_order, id");
    let rows = sqlx::query_as::<_, Category>(&sql)
        .bind(parent_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn create(pool: &SqlitePool, data: CategoryCreate) -> RepoResult<Category> {
    if let Some(parent_id) = data.parent_id {
        if find_by_id(pool, parent_id).await?.is_none() {
            return Err(RepoError::Validation(format!(
                "Parent category {parent_id} not found"
            )));
        }
    }
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO categories (id, name, parent_id, sort_order, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
    )
    .bind(id)
    .bind(data.name)
    .bind(data.parent_id)
    .bind(data.sort_order.unwrap_or(0))
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create category".into()))
}

pub async fn update(pool: &SqlitePool, id: i64, data: CategoryUpdate) -> RepoResult<Category> {
    if data.parent_id == Some(id) {
        return Err(RepoError::Validation("Category cannot be its own parent".into()));
    }
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE categories SET name = COALESCE(?1, name), parent_id = COALESCE(?2, parent_id), \
         sort_order = COALESCE(?3, sort_order), is_active = COALESCE(?4, is_active), \
         updated_at = ?5 WHERE id = ?6",
    )
    .bind(data.name)
    .bind(data.parent_id)
    .bind(data.sort_order)
    .bind(data.is_active)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Category {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Category {id} not found")))
}

pub async fn soft_delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE categories SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}
