//! End-to-end order lifecycle tests driving the service layer against an
//! in-memory database: place → pay → ship → deliver → sweep → complete,
//! plus the transition matrix and cancellation stock release.

use std::sync::Arc;

use sqlx::SqlitePool;
use store_server::db::DbService;
use store_server::inventory::StockLedger;
use store_server::loyalty::LoyaltyEngine;
use store_server::orders::{CompletionSweeper, LifecycleError, LifecycleManager};
use store_server::settings::SettingsService;

use shared::models::{OrderLine, OrderStatus};
use shared::SYSTEM_ACTOR;

const MILLIS_PER_DAY: i64 = 86_400_000;

struct Harness {
    pool: SqlitePool,
    lifecycle: Arc<LifecycleManager>,
    sweeper: CompletionSweeper,
    ledger: StockLedger,
}

/// Seed: one customer, one variant priced 125,000 with 10 units in one
/// warehouse, one gateway payment method.
async fn harness() -> Harness {
    let db = DbService::in_memory().await.unwrap();
    let pool = db.pool;
    let now = shared::util::now_millis();

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, display_name, created_at, updated_at) \
         VALUES (1, 'linh@example.com', 'x', 'Linh', ?1, ?1)",
    )
    .bind(now)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO products (id, name, created_at, updated_at) VALUES (1, 'Ao thun', ?1, ?1)")
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO product_variants (id, product_id, sku, name, price, created_at, updated_at) \
         VALUES (10, 1, 'AT-M', 'Ao thun M', 125000, ?1, ?1)",
    )
    .bind(now)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO warehouses (id, code, name, created_at, updated_at) VALUES (20, 'HCM', 'Saigon DC', ?1, ?1)")
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO variant_stock (id, variant_id, warehouse_id, quantity, reserved, updated_at) \
         VALUES (30, 10, 20, 10, 0, ?1)",
    )
    .bind(now)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO payment_methods (id, code, name, is_gateway, created_at, updated_at) \
         VALUES (40, 'gateway_qr', 'QR Pay', 1, ?1, ?1)",
    )
    .bind(now)
    .execute(&pool)
    .await
    .unwrap();

    let settings = SettingsService::new(pool.clone());
    let loyalty = LoyaltyEngine::new(pool.clone(), settings.clone());
    let lifecycle = Arc::new(LifecycleManager::new(pool.clone(), loyalty));
    let sweeper = CompletionSweeper::new(pool.clone(), lifecycle.clone(), settings);
    let ledger = StockLedger::new(pool.clone());

    Harness {
        pool,
        lifecycle,
        sweeper,
        ledger,
    }
}

fn two_units() -> Vec<OrderLine> {
    vec![OrderLine {
        variant_id: 10,
        warehouse_id: 20,
        quantity: 2,
    }]
}

#[tokio::test]
async fn full_lifecycle_scenario() {
    let h = harness().await;

    // Place: total 250,000, reservation 2 of 10
    let order = h
        .lifecycle
        .place_order(1, &two_units(), Some(40), None)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount, 250_000.0);

    let stock = h.ledger.stock_of(10, 20).await.unwrap().unwrap();
    assert_eq!(stock.reserved, 2);
    assert_eq!(stock.available(), 8);

    // Walk the forward path
    for status in [
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ] {
        h.lifecycle.transition(order.id, status, 7, None).await.unwrap();
    }

    let delivered = h.lifecycle.get(order.id).await.unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert!(delivered.delivered_at.is_some());

    // Shipment converted the reservation into a deduction
    let stock = h.ledger.stock_of(10, 20).await.unwrap().unwrap();
    assert_eq!(stock.quantity, 8);
    assert_eq!(stock.reserved, 0);

    // Seven days and one second later the sweeper promotes the order
    sqlx::query("UPDATE orders SET delivered_at = delivered_at - ? WHERE id = ?")
        .bind(7 * MILLIS_PER_DAY + 1000)
        .bind(order.id)
        .execute(&h.pool)
        .await
        .unwrap();

    let report = h.sweeper.run_once().await.unwrap();
    assert_eq!(report.completed, 1);

    let completed = h.lifecycle.get(order.id).await.unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);
    assert!(completed.completed_at.is_some());

    // One earn_purchase entry, aggregate spend bumped by the order total
    let earns: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM point_transactions WHERE order_id = ? AND kind = 'earn_purchase'",
    )
    .bind(order.id)
    .fetch_one(&h.pool)
    .await
    .unwrap();
    assert_eq!(earns, 1);

    let (points, spent): (i64, f64) =
        sqlx::query_as("SELECT points_balance, total_spent FROM users WHERE id = 1")
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(points, 25);
    assert_eq!(spent, 250_000.0);

    // Five transitions, five history rows; the last one is the sweeper's
    let history = h.lifecycle.history(order.id).await.unwrap();
    assert_eq!(history.len(), 5);
    let last = history.last().unwrap();
    assert_eq!(last.actor_id, SYSTEM_ACTOR);
    assert_eq!(last.new_status, OrderStatus::Completed);
    assert!(last.comment.as_deref().unwrap().contains("grace window"));
}

#[tokio::test]
async fn transition_matrix_matches_the_graph() {
    let h = harness().await;
    let now = shared::util::now_millis();

    let mut next_id = 1000;
    for from in OrderStatus::ALL {
        for to in OrderStatus::ALL {
            next_id += 1;
            let delivered_at = matches!(
                from,
                OrderStatus::Delivered | OrderStatus::Completed
            )
            .then_some(now);
            sqlx::query(
                "INSERT INTO orders (id, order_number, user_id, status, total_amount, placed_at, \
                 delivered_at, created_at, updated_at) VALUES (?1, ?2, 1, ?3, 99000, ?4, ?5, ?4, ?4)",
            )
            .bind(next_id)
            .bind(format!("SO-M-{next_id}"))
            .bind(from)
            .bind(now)
            .bind(delivered_at)
            .execute(&h.pool)
            .await
            .unwrap();

            let result = h.lifecycle.transition(next_id, to, 7, None).await;
            let history = h.lifecycle.history(next_id).await.unwrap();
            let current = h.lifecycle.get(next_id).await.unwrap();

            if from == to {
                // Idempotent no-op: success, nothing recorded
                assert!(result.is_ok(), "{from} -> {to} no-op must succeed");
                assert_eq!(history.len(), 0);
            } else if from.can_transition_to(to) {
                assert!(result.is_ok(), "{from} -> {to} must succeed");
                assert_eq!(history.len(), 1, "{from} -> {to} writes one history row");
                assert_eq!(current.status, to);
            } else {
                match result {
                    Err(LifecycleError::InvalidTransition { from: f, to: t }) => {
                        assert_eq!(f, from);
                        assert_eq!(t, to);
                    }
                    other => panic!("{from} -> {to} should be invalid, got {other:?}"),
                }
                // State unchanged, nothing recorded
                assert_eq!(current.status, from);
                assert_eq!(history.len(), 0);
            }
        }
    }
}

#[tokio::test]
async fn cancellation_releases_exactly_the_reserved_quantity() {
    let h = harness().await;

    let order = h
        .lifecycle
        .place_order(
            1,
            &[OrderLine {
                variant_id: 10,
                warehouse_id: 20,
                quantity: 4,
            }],
            Some(40),
            None,
        )
        .await
        .unwrap();

    let stock = h.ledger.stock_of(10, 20).await.unwrap().unwrap();
    assert_eq!(stock.reserved, 4);

    h.lifecycle
        .transition(order.id, OrderStatus::Cancelled, 1, Some("changed my mind"))
        .await
        .unwrap();

    // Reservation returned, on-hand count untouched
    let stock = h.ledger.stock_of(10, 20).await.unwrap().unwrap();
    assert_eq!(stock.reserved, 0);
    assert_eq!(stock.quantity, 10);
}

#[tokio::test]
async fn multi_line_reservation_is_all_or_none() {
    let h = harness().await;
    let now = shared::util::now_millis();

    // Second variant with no stock row
    sqlx::query(
        "INSERT INTO product_variants (id, product_id, sku, name, price, created_at, updated_at) \
         VALUES (11, 1, 'AT-L', 'Ao thun L', 135000, ?1, ?1)",
    )
    .bind(now)
    .execute(&h.pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO variant_stock (id, variant_id, warehouse_id, quantity, reserved, updated_at) \
         VALUES (31, 11, 20, 1, 0, ?1)",
    )
    .bind(now)
    .execute(&h.pool)
    .await
    .unwrap();

    let lines = vec![
        OrderLine {
            variant_id: 10,
            warehouse_id: 20,
            quantity: 2,
        },
        OrderLine {
            variant_id: 11,
            warehouse_id: 20,
            quantity: 5, // only 1 available
        },
    ];

    let err = h.lifecycle.place_order(1, &lines, Some(40), None).await;
    assert!(matches!(err, Err(LifecycleError::Stock(_))));

    // Line 1's reservation was rolled back with the order
    let stock = h.ledger.stock_of(10, 20).await.unwrap().unwrap();
    assert_eq!(stock.reserved, 0);
    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(orders, 0);
}

#[tokio::test]
async fn payment_confirmation_is_idempotent_and_single_paid() {
    let h = harness().await;

    let order = h
        .lifecycle
        .place_order(1, &two_units(), Some(40), None)
        .await
        .unwrap();

    let code = "PAY-TEST-001";
    store_server::db::repository::payment::create_transaction(
        &h.pool,
        code,
        order.id,
        40,
        order.total_amount,
    )
    .await
    .unwrap();

    let confirmed = h
        .lifecycle
        .confirm_payment(code, Some("GW-777"), 250_000.0)
        .await
        .unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);

    let (status, paid_at): (String, Option<i64>) = sqlx::query_as(
        "SELECT status, paid_at FROM payment_transactions WHERE transaction_code = ?",
    )
    .bind(code)
    .fetch_one(&h.pool)
    .await
    .unwrap();
    assert_eq!(status, "paid");
    assert!(paid_at.is_some());

    // Webhook replay: no error, no second history row
    let replay = h
        .lifecycle
        .confirm_payment(code, Some("GW-777"), 250_000.0)
        .await
        .unwrap();
    assert_eq!(replay.status, OrderStatus::Confirmed);
    assert_eq!(h.lifecycle.history(order.id).await.unwrap().len(), 1);

    // A second pending transaction for the same order can never reach paid
    let code2 = "PAY-TEST-002";
    store_server::db::repository::payment::create_transaction(
        &h.pool,
        code2,
        order.id,
        40,
        order.total_amount,
    )
    .await
    .unwrap();
    let second = h.lifecycle.confirm_payment(code2, None, 250_000.0).await;
    assert!(second.is_err(), "second paid for one order must be rejected");
}

#[tokio::test]
async fn amount_mismatch_is_rejected_and_leaves_payment_pending() {
    let h = harness().await;

    let order = h
        .lifecycle
        .place_order(1, &two_units(), Some(40), None)
        .await
        .unwrap();
    store_server::db::repository::payment::create_transaction(
        &h.pool,
        "PAY-TEST-003",
        order.id,
        40,
        order.total_amount,
    )
    .await
    .unwrap();

    let err = h
        .lifecycle
        .confirm_payment("PAY-TEST-003", None, 1_000.0)
        .await;
    assert!(matches!(err, Err(LifecycleError::AmountMismatch { .. })));

    let status: String =
        sqlx::query_scalar("SELECT status FROM payment_transactions WHERE transaction_code = ?")
            .bind("PAY-TEST-003")
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(status, "pending");
    assert_eq!(
        h.lifecycle.get(order.id).await.unwrap().status,
        OrderStatus::Pending
    );
}

#[tokio::test]
async fn refund_marks_payment_refunded() {
    let h = harness().await;

    let order = h
        .lifecycle
        .place_order(1, &two_units(), Some(40), None)
        .await
        .unwrap();
    store_server::db::repository::payment::create_transaction(
        &h.pool,
        "PAY-TEST-004",
        order.id,
        40,
        order.total_amount,
    )
    .await
    .unwrap();
    h.lifecycle
        .confirm_payment("PAY-TEST-004", None, 250_000.0)
        .await
        .unwrap();

    h.lifecycle
        .transition(order.id, OrderStatus::Refunded, 7, Some("defective item"))
        .await
        .unwrap();

    let status: String =
        sqlx::query_scalar("SELECT status FROM payment_transactions WHERE transaction_code = ?")
            .bind("PAY-TEST-004")
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(status, "refunded");
    assert!(h.lifecycle.get(order.id).await.unwrap().status.is_terminal());
}
