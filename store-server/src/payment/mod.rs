//! Payment domain: gateway adapter and checkout/webhook orchestration.

pub mod gateway;

pub use gateway::{GatewayClient, GatewayConfig, GatewayError, IntentStatus, PaymentIntent};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::repository::{order, payment, user};
use crate::orders::LifecycleManager;
use crate::utils::{AppError, AppResult};
use shared::models::{Order, OrderStatus, PaymentStatus, PaymentTransaction};

/// What the client needs to send the buyer to the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub transaction_code: String,
    pub checkout_url: String,
    pub qr_payload: Option<String>,
}

/// Orchestrates payment transactions against the external gateway.
#[derive(Clone)]
pub struct PaymentService {
    pool: SqlitePool,
    gateway: Arc<GatewayClient>,
    lifecycle: Arc<LifecycleManager>,
}

impl PaymentService {
    pub fn new(pool: SqlitePool, gateway: Arc<GatewayClient>, lifecycle: Arc<LifecycleManager>) -> Self {
        Self {
            pool,
            gateway,
            lifecycle,
        }
    }

    /// Create a payment intent for a pending order.
    ///
    /// The unique transaction code is minted and persisted BEFORE the
    /// gateway call, so a timed-out create is never blindly retried —
    /// the transaction stays `pending` and the caller re-queries.
    pub async fn start_checkout(&self, order_id: i64) -> AppResult<CheckoutSession> {
        let order = order::find_by_id(&self.pool, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {order_id}")))?;

        if order.status != OrderStatus::Pending {
            return Err(AppError::Validation(format!(
                "payment can only start for a pending order (status: {})",
                order.status
            )));
        }

        let method_id = order
            .payment_method_id
            .ok_or_else(|| AppError::Validation("order has no payment method".into()))?;
        let method = payment::find_method_by_id(&self.pool, method_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment method {method_id}")))?;
        if !method.is_gateway {
            return Err(AppError::Validation(format!(
                "payment method {} is not gateway-backed",
                method.code
            )));
        }

        let buyer = user::find_by_id(&self.pool, order.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", order.user_id)))?;

        let transaction_code = shared::util::transaction_code();
        payment::create_transaction(
            &self.pool,
            &transaction_code,
            order.id,
            method_id,
            order.total_amount,
        )
        .await?;

        let description = format!("Order {}", order.order_number);
        let intent = match self
            .gateway
            .create_intent(&transaction_code, order.total_amount, &description, &buyer.email)
            .await
        {
            Ok(intent) => intent,
            Err(GatewayError::Timeout) => {
                // Unknown outcome: the transaction stays pending and the
                // caller retries the status query, never the create.
                tracing::warn!(%transaction_code, "gateway create timed out, intent state unknown");
                return Err(AppError::GatewayTimeout);
            }
            Err(e @ GatewayError::Rejected { .. }) => {
                // Definitive refusal: close the transaction
                let mut conn = self.pool.acquire().await.map_err(|err| {
                    AppError::Database(err.to_string())
                })?;
                payment::mark_failed(&mut conn, &transaction_code).await?;
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        payment::attach_gateway_ref(
            &self.pool,
            &transaction_code,
            &intent.gateway_txn_id,
            Some(&serde_json::json!({ "checkout_url": intent.checkout_url }).to_string()),
        )
        .await?;

        Ok(CheckoutSession {
            transaction_code,
            checkout_url: intent.checkout_url,
            qr_payload: intent.qr_payload,
        })
    }

    /// Handle an inbound gateway webhook.
    ///
    /// The payload is untrusted until the HMAC over its sorted fields
    /// matches. Replays are harmless: confirmation is idempotent.
    pub async fn handle_webhook(
        &self,
        fields: BTreeMap<String, String>,
        signature: &str,
    ) -> AppResult<Order> {
        self.gateway.verify_webhook(&fields, signature)?;

        let transaction_code = fields
            .get("transaction_code")
            .ok_or_else(|| AppError::Validation("webhook missing transaction_code".into()))?;
        let status = fields
            .get("status")
            .ok_or_else(|| AppError::Validation("webhook missing status".into()))?;

        match status.as_str() {
            "success" => {
                let amount: f64 = fields
                    .get("amount")
                    .and_then(|a| a.parse().ok())
                    .ok_or_else(|| AppError::Validation("webhook missing amount".into()))?;
                let gateway_txn_id = fields.get("gateway_txn_id").map(|s| s.as_str());
                let order = self
                    .lifecycle
                    .confirm_payment(transaction_code, gateway_txn_id, amount)
                    .await?;
                Ok(order)
            }
            "failed" => {
                let mut conn = self
                    .pool
                    .acquire()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                payment::mark_failed(&mut conn, transaction_code).await?;
                let tx = payment::find_by_code(&self.pool, transaction_code)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(format!("Payment {transaction_code}"))
                    })?;
                let order = order::find_by_id(&self.pool, tx.order_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Order {}", tx.order_id)))?;
                Ok(order)
            }
            other => Err(AppError::Validation(format!(
                "unknown webhook status: {other}"
            ))),
        }
    }

    /// Local view of a payment transaction.
    pub async fn find_transaction(&self, transaction_code: &str) -> AppResult<PaymentTransaction> {
        payment::find_by_code(&self.pool, transaction_code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {transaction_code}")))
    }

    /// Re-query the gateway for a pending transaction (retryable read).
    pub async fn refresh_status(&self, transaction_code: &str) -> AppResult<PaymentTransaction> {
        let local = self.find_transaction(transaction_code).await?;
        if local.status != PaymentStatus::Pending {
            return Ok(local);
        }

        let remote = self.gateway.query_intent(transaction_code).await?;
        match remote.status.as_str() {
            "success" => {
                let amount = remote.amount.unwrap_or(local.amount);
                self.lifecycle
                    .confirm_payment(transaction_code, Some(&remote.gateway_txn_id), amount)
                    .await?;
            }
            "failed" | "expired" => {
                let mut conn = self
                    .pool
                    .acquire()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                payment::mark_failed(&mut conn, transaction_code).await?;
            }
            _ => {}
        }
        self.find_transaction(transaction_code).await
    }

    pub async fn transactions_for_order(&self, order_id: i64) -> AppResult<Vec<PaymentTransaction>> {
        Ok(payment::list_by_order(&self.pool, order_id).await?)
    }
}
