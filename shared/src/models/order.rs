//! Order Model
//!
//! 订单实体与状态机。状态图是整个履约流程的唯一事实来源：
//! 服务端、客户端与测试都通过 [`OrderStatus::can_transition_to`] 判断合法迁移。

use serde::{Deserialize, Serialize};

/// Actor id recorded on history rows written by the system itself
/// (sweeper, payment webhook) rather than a logged-in user.
pub const SYSTEM_ACTOR: i64 = 0;

/// Order lifecycle status.
///
/// Forward path: pending → confirmed → processing → shipped → delivered →
/// completed. `cancelled` is only reachable before shipment; `refunded` is a
/// terminal override for any post-payment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// 是否已过支付节点（refunded 只能从这些状态进入）
    pub fn is_post_payment(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed
                | OrderStatus::Processing
                | OrderStatus::Shipped
                | OrderStatus::Delivered
        )
    }

    /// Whether `self → new` is an allowed transition.
    ///
    /// Same-status is NOT listed here; callers treat it as an idempotent
    /// no-op rather than a transition.
    pub fn can_transition_to(&self, new: OrderStatus) -> bool {
        use OrderStatus::*;
        match (*self, new) {
            (Pending, Confirmed) => true,
            (Confirmed, Processing) => true,
            (Processing, Shipped) => true,
            (Shipped, Delivered) => true,
            (Delivered, Completed) => true,
            // Cancellation is only possible before shipment; later the
            // order must go through refund instead.
            (Pending | Confirmed | Processing, Cancelled) => true,
            (from, Refunded) => from.is_post_payment(),
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .iter()
            .find(|v| v.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

/// Order entity (订单)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub user_id: i64,
    pub status: OrderStatus,
    pub total_amount: f64,
    pub currency: String,
    pub payment_method_id: Option<i64>,
    pub note: Option<String>,
    pub placed_at: i64,
    pub delivered_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Order line item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub variant_id: i64,
    pub warehouse_id: i64,
    pub quantity: i64,
    pub unit_price: f64,
}

/// Input line used when placing an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub variant_id: i64,
    pub warehouse_id: i64,
    pub quantity: i64,
}

/// Append-only status change record.
///
/// 每次状态迁移写入且仅写入一行，与状态更新同一事务提交；
/// 永不更新、永不删除。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OrderStatusHistory {
    pub id: i64,
    pub order_id: i64,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub actor_id: i64,
    pub comment: Option<String>,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_allowed() {
        use OrderStatus::*;
        for (from, to) in [
            (Pending, Confirmed),
            (Confirmed, Processing),
            (Processing, Shipped),
            (Shipped, Delivered),
            (Delivered, Completed),
        ] {
            assert!(from.can_transition_to(to), "{from} -> {to} should be valid");
        }
    }

    #[test]
    fn backward_moves_are_rejected() {
        use OrderStatus::*;
        assert!(!Shipped.can_transition_to(Confirmed));
        assert!(!Delivered.can_transition_to(Processing));
        assert!(!Confirmed.can_transition_to(Pending));
    }

    #[test]
    fn cancellation_only_before_shipment() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
    }

    #[test]
    fn refund_requires_payment() {
        use OrderStatus::*;
        assert!(!Pending.can_transition_to(Refunded));
        assert!(Confirmed.can_transition_to(Refunded));
        assert!(Shipped.can_transition_to(Refunded));
        assert!(Delivered.can_transition_to(Refunded));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        use OrderStatus::*;
        for terminal in [Completed, Cancelled, Refunded] {
            assert!(terminal.is_terminal());
            for to in OrderStatus::ALL {
                assert!(
                    !terminal.can_transition_to(to),
                    "{terminal} -> {to} must be invalid"
                );
            }
        }
    }

    #[test]
    fn status_roundtrips_through_str() {
        for s in OrderStatus::ALL {
            let parsed: OrderStatus = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }
}
