//! User Repository

use super::{RepoError, RepoResult};
use shared::models::{User, UserUpdate};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

const USER_SELECT: &str = "SELECT id, email, password_hash, display_name, role, email_verified, \
     points_balance, total_spent, is_active, created_at, updated_at FROM users";

pub async fn find_by_id<'e, E>(ex: E, id: i64) -> RepoResult<Option<User>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{USER_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, User>(&sql).bind(id).fetch_optional(ex).await?;
    Ok(row)
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> RepoResult<Option<User>> {
    let sql = format!("{USER_SELECT} WHERE email = ? AND is_active = 1");
    let row = sqlx::query_as::<_, User>(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_all(pool: &SqlitePool) -> RepoResult<Vec<User>> {
    let sql = format!("{USER_SELECT} WHERE is_active = 1 ORDER BY created_at DESC");
    let rows = sqlx::query_as::<_, User>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

pub async fn create(
    pool: &SqlitePool,
    email: &str,
    password_hash: &str,
    display_name: &str,
    role: &str,
) -> RepoResult<User> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, display_name, role, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
    )
    .bind(id)
    .bind(email)
    .bind(password_hash)
    .bind(display_name)
    .bind(role)
    .bind(now)
    .execute(pool)
    .await?;

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create user".into()))
}

pub async fn update(pool: &SqlitePool, id: i64, data: UserUpdate) -> RepoResult<User> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE users SET display_name = COALESCE(?1, display_name), \
         role = COALESCE(?2, role), is_active = COALESCE(?3, is_active), updated_at = ?4 \
         WHERE id = ?5",
    )
    .bind(data.display_name)
    .bind(data.role)
    .bind(data.is_active)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("User {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("User {id} not found")))
}

pub async fn soft_delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let now = shared::util::now_millis();
    let rows = sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(rows.rows_affected() > 0)
}

pub async fn set_password(pool: &SqlitePool, id: i64, password_hash: &str) -> RepoResult<()> {
    let now = shared::util::now_millis();
    let rows = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("User {id} not found")));
    }
    Ok(())
}

pub async fn set_email_verified(pool: &SqlitePool, id: i64) -> RepoResult<()> {
    let now = shared::util::now_millis();
    sqlx::query("UPDATE users SET email_verified = 1, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Bump the legacy aggregate-spend figure. Called exactly once per order,
/// inside the completing transaction.
pub async fn add_total_spent(
    conn: &mut SqliteConnection,
    user_id: i64,
    amount: f64,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    sqlx::query("UPDATE users SET total_spent = total_spent + ?1, updated_at = ?2 WHERE id = ?3")
        .bind(amount)
        .bind(now)
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}
