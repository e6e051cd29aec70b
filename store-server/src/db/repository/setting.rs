//! Settings Repository

use super::RepoResult;
use shared::models::Setting;
use sqlx::{Sqlite, SqlitePool};

pub async fn get<'e, E>(ex: E, key: &str) -> RepoResult<Option<Setting>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, Setting>(
        "SELECT key, value, value_type, updated_at FROM settings WHERE key = ?",
    )
    .bind(key)
    .fetch_optional(ex)
    .await?;
    Ok(row)
}

pub async fn all(pool: &SqlitePool) -> RepoResult<Vec<Setting>> {
    let rows = sqlx::query_as::<_, Setting>(
        "SELECT key, value, value_type, updated_at FROM settings ORDER BY key",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn upsert(pool: &SqlitePool, key: &str, value: &str, value_type: &str) -> RepoResult<()> {
    let now = shared::util::now_millis();
    sqlx::query(
        "INSERT INTO settings (key, value, value_type, updated_at) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT (key) DO UPDATE SET value = excluded.value, \
         value_type = excluded.value_type, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .bind(value_type)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}
