//! Cart Models

use serde::{Deserialize, Serialize};

/// Shopping cart — one open cart per user, closed on checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Cart {
    pub id: i64,
    pub user_id: i64,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Cart line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct CartItem {
    pub id: i64,
    pub cart_id: i64,
    pub variant_id: i64,
    pub warehouse_id: i64,
    pub quantity: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItemCreate {
    pub variant_id: i64,
    pub warehouse_id: i64,
    pub quantity: i64,
}
