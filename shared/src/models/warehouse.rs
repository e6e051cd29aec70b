//! Warehouse & Stock Models
//!
//! 库存实体。`VariantStock` 的 `reserved <= quantity` 不靠存储约束，
//! 由 Stock Ledger 的条件更新保证。

use serde::{Deserialize, Serialize};

/// Warehouse entity (仓库)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Warehouse {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseCreate {
    pub code: String,
    pub name: String,
}

/// Per (variant, warehouse) stock counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct VariantStock {
    pub id: i64,
    pub variant_id: i64,
    pub warehouse_id: i64,
    pub quantity: i64,
    pub reserved: i64,
    pub updated_at: i64,
}

impl VariantStock {
    /// Units that can still be promised to new orders.
    pub fn available(&self) -> i64 {
        (self.quantity - self.reserved).max(0)
    }
}

/// Append-only audit row for every direct quantity change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct InventoryTransaction {
    pub id: i64,
    pub variant_id: i64,
    pub warehouse_id: i64,
    pub delta: i64,
    pub balance_after: i64,
    pub reason: String,
    pub actor_id: i64,
    pub created_at: i64,
}

/// Low-stock alert. Raised when available crosses below the effective
/// threshold; not re-raised while an open alert exists for the variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct StockAlert {
    pub id: i64,
    pub variant_id: i64,
    pub warehouse_id: i64,
    pub available: i64,
    pub threshold: i64,
    pub status: String,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_floors_at_zero() {
        let s = VariantStock {
            id: 1,
            variant_id: 1,
            warehouse_id: 1,
            quantity: 2,
            reserved: 5,
            updated_at: 0,
        };
        assert_eq!(s.available(), 0);
    }
}
