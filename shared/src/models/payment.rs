//! Payment Models

use serde::{Deserialize, Serialize};

/// Payment transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment method entity (支付方式)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PaymentMethod {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub is_gateway: bool,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodCreate {
    pub code: String,
    pub name: String,
    pub is_gateway: bool,
}

/// Payment transaction.
///
/// `transaction_code` 全局唯一，在调用网关之前生成；
/// `amount` 创建后不可变；每个订单最多一笔 paid。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PaymentTransaction {
    pub id: i64,
    pub transaction_code: String,
    pub order_id: i64,
    pub payment_method_id: i64,
    pub gateway_txn_id: Option<String>,
    pub status: PaymentStatus,
    pub amount: f64,
    pub paid_at: Option<i64>,
    pub metadata: Option<String>,
    pub created_at: i64,
}
