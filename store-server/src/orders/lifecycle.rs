//! Order Lifecycle Manager
//!
//! 订单状态机的唯一入口。负责：
//! - 校验并执行状态迁移，追加不可变的状态历史
//! - 下单时的整单库存预留（全部成功或全部失败）
//! - 取消时释放预留、完成时更新累计消费并触发积分累积
//! - 支付确认（pending → confirmed）
//!
//! # 事务边界
//!
//! 一次迁移的全部写入（状态 + 历史 + 库存副作用）在同一事务内提交，
//! 外部观察不到中间状态。积分累积是唯一的例外：它在事务提交之后
//! best-effort 执行，失败只记日志，绝不回滚已提交的迁移。

use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;

use crate::db::repository::{order, payment, product, user, RepoError};
use crate::inventory::{self, StockError};
use crate::loyalty::LoyaltyEngine;
use shared::models::{Order, OrderItem, OrderLine, OrderStatus, OrderStatusHistory};
use shared::SYSTEM_ACTOR;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error(transparent)]
    Stock(#[from] StockError),

    #[error("Payment amount mismatch: expected {expected}, got {got}")]
    AmountMismatch { expected: f64, got: f64 },

    #[error("Payment is not confirmable: {0}")]
    PaymentState(String),

    #[error("Invalid order: {0}")]
    Invalid(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<RepoError> for LifecycleError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound(msg) => LifecycleError::NotFound(msg),
            other => LifecycleError::Storage(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for LifecycleError {
    fn from(e: sqlx::Error) -> Self {
        LifecycleError::Storage(e.to_string())
    }
}

impl From<LifecycleError> for crate::utils::AppError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::NotFound(msg) => crate::utils::AppError::NotFound(msg),
            LifecycleError::InvalidTransition { from, to } => {
                crate::utils::AppError::InvalidTransition { from, to }
            }
            LifecycleError::Stock(stock) => stock.into(),
            LifecycleError::AmountMismatch { .. } | LifecycleError::PaymentState(_) => {
                crate::utils::AppError::Validation(e.to_string())
            }
            LifecycleError::Invalid(msg) => crate::utils::AppError::Validation(msg),
            LifecycleError::Storage(msg) => crate::utils::AppError::Database(msg),
        }
    }
}

/// Loyalty accrual owed after a committed completion.
#[derive(Debug, Clone)]
pub struct AccrualDue {
    pub order_id: i64,
    pub user_id: i64,
    pub total_amount: f64,
}

/// Result of one transition attempt inside a transaction.
#[derive(Debug)]
pub struct TransitionOutcome {
    pub order: Order,
    /// False for the idempotent same-status no-op.
    pub applied: bool,
    /// Present when the transition crossed delivered -> completed.
    pub accrual: Option<AccrualDue>,
}

#[derive(Clone)]
pub struct LifecycleManager {
    pool: SqlitePool,
    loyalty: LoyaltyEngine,
}

impl LifecycleManager {
    pub fn new(pool: SqlitePool, loyalty: LoyaltyEngine) -> Self {
        Self { pool, loyalty }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Place a new order: order row + items + whole-order stock reservation,
    /// all in one transaction. A single short line drops the entire order.
    pub async fn place_order(
        &self,
        user_id: i64,
        lines: &[OrderLine],
        payment_method_id: Option<i64>,
        note: Option<String>,
    ) -> Result<Order, LifecycleError> {
        if lines.is_empty() {
            return Err(LifecycleError::Invalid("order has no lines".into()));
        }
        if lines.iter().any(|l| l.quantity <= 0) {
            return Err(LifecycleError::Invalid("line quantity must be positive".into()));
        }

        let mut tx = self.pool.begin().await?;

        // Snapshot variant prices and compute the total
        let mut items = Vec::with_capacity(lines.len());
        let mut total = 0.0;
        for line in lines {
            let variant = product::find_variant(&mut *tx, line.variant_id)
                .await?
                .filter(|v| v.is_active)
                .ok_or_else(|| {
                    LifecycleError::NotFound(format!("Variant {} not found", line.variant_id))
                })?;
            total += variant.price * line.quantity as f64;
            items.push((line, variant.price));
        }

        let now = shared::util::now_millis();
        let mut order = Order {
            id: shared::util::snowflake_id(),
            order_number: shared::util::order_number(),
            user_id,
            status: OrderStatus::Pending,
            total_amount: total,
            currency: "VND".to_string(),
            payment_method_id,
            note,
            placed_at: now,
            delivered_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        // Order numbers are random-suffixed; regenerate on the rare collision
        let mut attempts = 0;
        loop {
            match order::insert(&mut tx, &order).await {
                Ok(()) => break,
                Err(RepoError::Duplicate(_)) if attempts < 3 => {
                    attempts += 1;
                    order.order_number = shared::util::order_number();
                }
                Err(e) => return Err(e.into()),
            }
        }

        for (line, unit_price) in items {
            order::insert_item(
                &mut tx,
                &OrderItem {
                    id: shared::util::snowflake_id(),
                    order_id: order.id,
                    variant_id: line.variant_id,
                    warehouse_id: line.warehouse_id,
                    quantity: line.quantity,
                    unit_price,
                },
            )
            .await?;
            // All-or-none: a failed reservation aborts the whole transaction
            inventory::reserve_in(&mut tx, line.variant_id, line.warehouse_id, line.quantity)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(
            order_id = order.id,
            order_number = %order.order_number,
            total = order.total_amount,
            "order placed"
        );
        Ok(order)
    }

    /// Apply a status transition with all its side effects.
    pub async fn transition(
        &self,
        order_id: i64,
        new_status: OrderStatus,
        actor_id: i64,
        comment: Option<&str>,
    ) -> Result<Order, LifecycleError> {
        let mut tx = self.pool.begin().await?;
        let outcome = transition_in(&mut tx, order_id, new_status, actor_id, comment).await?;
        tx.commit().await?;

        if let Some(due) = &outcome.accrual {
            self.settle_accrual(due).await;
        }
        Ok(outcome.order)
    }

    /// Best-effort loyalty accrual after a committed completion. Failures
    /// are logged and swallowed.
    pub(crate) async fn settle_accrual(&self, due: &AccrualDue) {
        if let Err(e) = self
            .loyalty
            .process_order_earning(due.order_id, due.user_id, due.total_amount)
            .await
        {
            tracing::warn!(
                order_id = due.order_id,
                user_id = due.user_id,
                error = %e,
                "loyalty accrual failed, order completion stands"
            );
        }
    }

    /// Confirm a payment transaction and move the order pending -> confirmed.
    ///
    /// Safe to call twice for the same webhook: an already-paid transaction
    /// is a no-op returning the current order.
    pub async fn confirm_payment(
        &self,
        transaction_code: &str,
        gateway_txn_id: Option<&str>,
        amount: f64,
    ) -> Result<Order, LifecycleError> {
        let mut tx = self.pool.begin().await?;

        let payment_tx = payment::find_by_code(&mut *tx, transaction_code)
            .await?
            .ok_or_else(|| {
                LifecycleError::NotFound(format!("Payment {transaction_code} not found"))
            })?;

        if payment_tx.status == shared::models::PaymentStatus::Paid {
            let order = order::find_by_id(&mut *tx, payment_tx.order_id)
                .await?
                .ok_or_else(|| {
                    LifecycleError::NotFound(format!("Order {} not found", payment_tx.order_id))
                })?;
            return Ok(order);
        }

        if (payment_tx.amount - amount).abs() > 0.005 {
            return Err(LifecycleError::AmountMismatch {
                expected: payment_tx.amount,
                got: amount,
            });
        }

        if !payment::try_mark_paid(&mut tx, transaction_code, gateway_txn_id).await? {
            return Err(LifecycleError::PaymentState(format!(
                "payment {transaction_code} is {}",
                payment_tx.status
            )));
        }

        let outcome = transition_in(
            &mut tx,
            payment_tx.order_id,
            OrderStatus::Confirmed,
            SYSTEM_ACTOR,
            Some("payment confirmed"),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            order_id = outcome.order.id,
            transaction_code,
            "payment confirmed, order confirmed"
        );
        Ok(outcome.order)
    }

    pub async fn get(&self, order_id: i64) -> Result<Order, LifecycleError> {
        order::find_by_id(&self.pool, order_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("Order {order_id} not found")))
    }

    pub async fn items(&self, order_id: i64) -> Result<Vec<OrderItem>, LifecycleError> {
        Ok(order::items_by_order(&self.pool, order_id).await?)
    }

    pub async fn history(&self, order_id: i64) -> Result<Vec<OrderStatusHistory>, LifecycleError> {
        Ok(order::history_by_order(&self.pool, order_id).await?)
    }
}

/// Execute one transition inside the caller's transaction.
///
/// Exactly one history row is appended per applied transition; the
/// same-status no-op appends nothing and touches nothing.
pub(crate) async fn transition_in(
    conn: &mut SqliteConnection,
    order_id: i64,
    new_status: OrderStatus,
    actor_id: i64,
    comment: Option<&str>,
) -> Result<TransitionOutcome, LifecycleError> {
    let order = order::find_by_id(&mut *conn, order_id)
        .await?
        .ok_or_else(|| LifecycleError::NotFound(format!("Order {order_id} not found")))?;

    let from = order.status;

    // Idempotent no-op: re-asserting the current status is not an error
    if from == new_status {
        return Ok(TransitionOutcome {
            order,
            applied: false,
            accrual: None,
        });
    }

    if !from.can_transition_to(new_status) {
        return Err(LifecycleError::InvalidTransition { from, to: new_status });
    }

    let now = shared::util::now_millis();
    let delivered_at = (new_status == OrderStatus::Delivered).then_some(now);
    let completed_at = (new_status == OrderStatus::Completed).then_some(now);

    order::update_status(&mut *conn, order_id, new_status, delivered_at, completed_at).await?;

    match new_status {
        // Cancellation only un-reserves; on-hand quantity is untouched
        OrderStatus::Cancelled => {
            for item in order::items_by_order(&mut *conn, order_id).await? {
                inventory::release_in(&mut *conn, item.variant_id, item.warehouse_id, item.quantity)
                    .await?;
            }
        }
        // Shipment converts reservations into physical deductions
        OrderStatus::Shipped => {
            for item in order::items_by_order(&mut *conn, order_id).await? {
                inventory::commit_sale_in(
                    &mut *conn,
                    item.variant_id,
                    item.warehouse_id,
                    item.quantity,
                )
                .await?;
            }
        }
        // Refund releases the paid transaction record
        OrderStatus::Refunded => {
            payment::mark_refunded(&mut *conn, order_id).await?;
        }
        _ => {}
    }

    // Completion bumps the customer's aggregate spend exactly once; the
    // graph guarantees the previous status was delivered, never another
    // completed-equivalent state.
    let accrual = if new_status == OrderStatus::Completed && from == OrderStatus::Delivered {
        user::add_total_spent(&mut *conn, order.user_id, order.total_amount).await?;
        Some(AccrualDue {
            order_id,
            user_id: order.user_id,
            total_amount: order.total_amount,
        })
    } else {
        None
    };

    order::insert_history(&mut *conn, order_id, from, new_status, actor_id, comment).await?;

    let order = order::find_by_id(&mut *conn, order_id)
        .await?
        .ok_or_else(|| LifecycleError::NotFound(format!("Order {order_id} not found")))?;

    Ok(TransitionOutcome {
        order,
        applied: true,
        accrual,
    })
}
