//! Product & Variant Repository

use super::{RepoError, RepoResult};
use shared::models::{
    Product, ProductCreate, ProductUpdate, ProductVariant, ProductVariantCreate,
    ProductVariantUpdate,
};
use sqlx::{Sqlite, SqlitePool};

const PRODUCT_SELECT: &str =
    "SELECT id, name, category_id, description, is_active, created_at, updated_at FROM products";

const VARIANT_SELECT: &str = "SELECT id, product_id, sku, name, price, low_stock_threshold, \
     is_active, created_at, updated_at FROM product_variants";

pub async fn find_all(pool: &SqlitePool) -> RepoResult<Vec<Product>> {
    let sql = format!("{PRODUCT_SELECT} WHERE is_active = 1 ORDER BY created_at DESC");
    let rows = sqlx::query_as::<_, Product>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Product>> {
    let sql = format!("{PRODUCT_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_by_category(pool: &SqlitePool, category_id: i64) -> RepoResult<Vec<Product>> {
    let sql = format!("{PRODUCT_SELECT} WHERE category_id = ? AND is_active = 1 ORDER BY name");
    let rows = sqlx::query_as::<_, Product>(&sql)
        .bind(category_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn create(pool: &SqlitePool, data: ProductCreate) -> RepoResult<Product> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO products (id, name, category_id, description, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
    )
    .bind(id)
    .bind(data.name)
    .bind(data.category_id)
    .bind(data.description)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create product".into()))
}

pub async fn update(pool: &SqlitePool, id: i64, data: ProductUpdate) -> RepoResult<Product> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE products SET name = COALESCE(?1, name), category_id = COALESCE(?2, category_id), \
         description = COALESCE(?3, description), is_active = COALESCE(?4, is_active), \
         updated_at = ?5 WHERE id = ?6",
    )
    .bind(data.name)
    .bind(data.category_id)
    .bind(data.description)
    .bind(data.is_active)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Product {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Product {id} not found")))
}

pub async fn soft_delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE products SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

// ========== Variants ==========

pub async fn find_variant<'e, E>(ex: E, id: i64) -> RepoResult<Option<ProductVariant>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{VARIANT_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, ProductVariant>(&sql)
        .bind(id)
        .fetch_optional(ex)
        .await?;
    Ok(row)
}

pub async fn find_variant_by_sku(pool: &SqlitePool, sku: &str) -> RepoResult<Option<ProductVariant>> {
    let sql = format!("{VARIANT_SELECT} WHERE sku = ?");
    let row = sqlx::query_as::<_, ProductVariant>(&sql)
        .bind(sku)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_variants_by_product(
    pool: &SqlitePool,
    product_id: i64,
) -> RepoResult<Vec<ProductVariant>> {
    let sql = format!("{VARIANT_SELECT} WHERE product_id = ? AND is_active = 1 ORDER BY sku");
    let rows = sqlx::query_as::<_, ProductVariant>(&sql)
        .bind(product_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn create_variant(
    pool: &SqlitePool,
    data: ProductVariantCreate,
) -> RepoResult<ProductVariant> {
    if find_by_id(pool, data.product_id).await?.is_none() {
        return Err(RepoError::Validation(format!(
            "Product {} not found",
            data.product_id
        )));
    }
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO product_variants (id, product_id, sku, name, price, low_stock_threshold, \
         created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
    )
    .bind(id)
    .bind(data.product_id)
    .bind(data.sku)
    .bind(data.name)
    .bind(data.price)
    .bind(data.low_stock_threshold)
    .bind(now)
    .execute(pool)
    .await?;
    find_variant(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create variant".into()))
}

pub async fn update_variant(
    pool: &SqlitePool,
    id: i64,
    data: ProductVariantUpdate,
) -> RepoResult<ProductVariant> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE product_variants SET name = COALESCE(?1, name), price = COALESCE(?2, price), \
         low_stock_threshold = COALESCE(?3, low_stock_threshold), \
         is_active = COALESCE(?4, is_active), updated_at = ?5 WHERE id = ?6",
    )
    .bind(data.name)
    .bind(data.price)
    .bind(data.low_stock_threshold)
    .bind(data.is_active)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Variant {id} not found")));
    }
    find_variant(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Variant {id} not found")))
}
