//! Loyalty Models
//!
//! 积分账本：余额 = 全部流水之和；每个订单最多一条 earn_purchase。

use serde::{Deserialize, Serialize};

/// Point transaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum PointTransactionKind {
    EarnPurchase,
    Redeem,
    Adjust,
    Expire,
}

impl PointTransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointTransactionKind::EarnPurchase => "earn_purchase",
            PointTransactionKind::Redeem => "redeem",
            PointTransactionKind::Adjust => "adjust",
            PointTransactionKind::Expire => "expire",
        }
    }
}

/// Append-only loyalty ledger entry.
///
/// `order_id` is set on earning entries; redemptions and adjustments carry
/// a note instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PointTransaction {
    pub id: i64,
    pub user_id: i64,
    pub kind: PointTransactionKind,
    pub points: i64,
    pub order_id: Option<i64>,
    pub note: Option<String>,
    pub created_at: i64,
}
