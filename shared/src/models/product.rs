//! Product Model

use serde::{Deserialize, Serialize};

/// Product entity (商品)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCreate {
    pub name: String,
    pub category_id: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// Sellable variant of a product (SKU 级别)
///
/// `low_stock_threshold` overrides the global setting when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ProductVariant {
    pub id: i64,
    pub product_id: i64,
    pub sku: String,
    pub name: String,
    pub price: f64,
    pub low_stock_threshold: Option<i64>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariantCreate {
    pub product_id: i64,
    pub sku: String,
    pub name: String,
    pub price: f64,
    pub low_stock_threshold: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariantUpdate {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub low_stock_threshold: Option<i64>,
    pub is_active: Option<bool>,
}
