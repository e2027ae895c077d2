//! End-to-end order lifecycle through the dispatcher: happy path with all
//! downstream side effects, cancellation compensation, and the
//! insufficient-stock saga.

#![allow(clippy::unwrap_used)]

mod common;

use common::Harness;
use storefront_core::clock::Clock;
use storefront_core::coupon::UserCouponStatus;
use storefront_core::delivery::DeliveryStatus;
use storefront_core::ids::{CouponId, ProductId, UserId};
use storefront_core::notify::Notification;
use storefront_core::order::OrderStatus;
use storefront_core::point::BalanceHistoryType;
use storefront_core::stats::StatKind;
use storefront_core::store::{CartStore, CouponStore, DeliveryStore};
use storefront_core::cart::CartItem;
use storefront_core::payment::PaymentMethod;
use storefront_core::memstore::StatsBuffer;
use storefront_services::payment::{GatewayCharge, PaymentRequest};
use storefront_testing::fixtures::{fixed_coupon, item};
use storefront_testing::mocks::test_clock;

/// Seed a user with balance, stock, a held coupon and a cart; pay a mixed
/// tender; after dispatch every downstream side effect has happened
/// exactly once — and replaying the whole outbox changes nothing.
#[tokio::test]
async fn full_order_flow_settles_every_side_effect() {
    let harness = Harness::new();
    let user = UserId::new(1);
    let coupon = CouponId::new(7);

    harness.stores.seed_balance(user, 50_000);
    harness.stores.seed_coupon(fixed_coupon(7, 5_000, 100));
    harness
        .stores
        .insert_issued(user, coupon, test_clock().now(), vec![])
        .await
        .unwrap();
    harness
        .services
        .inventory
        .set_stock(ProductId::new(1), 10)
        .await
        .unwrap();
    harness
        .stores
        .put_item(CartItem {
            user_id: user,
            product_id: ProductId::new(1),
            quantity: 2,
            updated_at: test_clock().now(),
        })
        .await
        .unwrap();

    // Subscribe before the flow so notifications are captured.
    let mut notifications = harness.services.notifier.subscribe(user).await;

    // total 40 000, coupon −5 000 → final 35 000
    let order = harness
        .services
        .orders
        .create_order(user, vec![item(1, 20_000, 2)], vec![coupon])
        .await
        .unwrap();
    assert_eq!(order.final_amount, 35_000);

    harness.gateway.script_success("toss_1");
    harness
        .services
        .payments
        .process(PaymentRequest {
            order_id: order.id,
            user_id: user,
            method: PaymentMethod::Mixed,
            point_amount: 20_000,
            gateway_amount: 15_000,
            gateway: Some(GatewayCharge {
                provider: "TOSS".to_string(),
                method: "CARD".to_string(),
                card_number_masked: Some("****1234".to_string()),
            }),
        })
        .await
        .unwrap();

    harness.dispatch_until_idle().await;

    // Order confirmed.
    let confirmed = harness.services.orders.get(order.id).await.unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);

    // Stock deducted once.
    let stock = harness
        .services
        .inventory
        .get(ProductId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stock.quantity, 8);

    // Coupon consumed.
    let held = harness
        .stores
        .find_user_coupon(user, coupon)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(held.status, UserCouponStatus::Used);
    assert_eq!(held.used_order_id, Some(order.id));

    // Delivery created.
    let delivery = harness
        .stores
        .get_delivery_by_order(order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Preparing);

    // Cart cleared.
    assert!(harness.stores.items(user).await.unwrap().is_empty());

    // Sale recorded for analytics.
    assert_eq!(
        harness
            .kv
            .realtime_count(StatKind::Sale, ProductId::new(1))
            .await
            .unwrap(),
        2
    );

    // Realtime notification delivered.
    let notification = notifications.try_recv().unwrap();
    assert_eq!(
        notification,
        Notification::PaymentCompleted {
            user_id: user,
            order_id: order.id,
            amount: 35_000,
        }
    );

    // Nothing dead-lettered, everything processed.
    assert!(harness.stores.all_dlq().is_empty());

    // Idempotent delivery: replay does not double anything.
    harness.dispatch_until_idle().await;
    let stock = harness
        .services
        .inventory
        .get(ProductId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stock.quantity, 8);
}

/// Cancelling a confirmed order compensates everything: stock restored,
/// points refunded, coupon back to ISSUED.
#[tokio::test]
async fn cancellation_compensates_stock_points_and_coupon() {
    let harness = Harness::new();
    let user = UserId::new(1);
    let coupon = CouponId::new(7);

    harness.stores.seed_balance(user, 50_000);
    harness.stores.seed_coupon(fixed_coupon(7, 5_000, 100));
    harness
        .stores
        .insert_issued(user, coupon, test_clock().now(), vec![])
        .await
        .unwrap();
    harness
        .services
        .inventory
        .set_stock(ProductId::new(1), 10)
        .await
        .unwrap();

    let order = harness
        .services
        .orders
        .create_order(user, vec![item(1, 20_000, 2)], vec![coupon])
        .await
        .unwrap();
    harness
        .services
        .payments
        .process(PaymentRequest {
            order_id: order.id,
            user_id: user,
            method: PaymentMethod::Balance,
            point_amount: 35_000,
            gateway_amount: 0,
            gateway: None,
        })
        .await
        .unwrap();
    harness.dispatch_until_idle().await;

    // Paid and fulfilled; now cancel.
    harness
        .services
        .orders
        .cancel(order.id, "user requested", uuid::Uuid::new_v4())
        .await
        .unwrap();
    harness.dispatch_until_idle().await;

    let cancelled = harness.services.orders.get(order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // Stock restored.
    let stock = harness
        .services
        .inventory
        .get(ProductId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stock.quantity, 10);

    // Points refunded, exactly once even across replays.
    let balance = harness.services.points.balance(user).await.unwrap();
    assert_eq!(balance.balance, 50_000);
    let refunds = harness
        .stores
        .all_histories(user)
        .into_iter()
        .filter(|h| h.history_type == BalanceHistoryType::Refund)
        .count();
    assert_eq!(refunds, 1);

    // Coupon back to ISSUED.
    let held = harness
        .stores
        .find_user_coupon(user, coupon)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(held.status, UserCouponStatus::Issued);

    assert!(harness.stores.all_dlq().is_empty());
}

/// Ordering more than the stock can cover: the inventory handler
/// publishes `InventoryInsufficient`, the order handler cancels, and the
/// point refund flows back.
#[tokio::test]
async fn insufficient_stock_cancels_and_refunds() {
    let harness = Harness::new();
    let user = UserId::new(1);

    harness.stores.seed_balance(user, 100_000);
    harness
        .services
        .inventory
        .set_stock(ProductId::new(1), 1)
        .await
        .unwrap();

    let order = harness
        .services
        .orders
        .create_order(user, vec![item(1, 10_000, 3)], vec![])
        .await
        .unwrap();
    harness
        .services
        .payments
        .process(PaymentRequest {
            order_id: order.id,
            user_id: user,
            method: PaymentMethod::Balance,
            point_amount: 30_000,
            gateway_amount: 0,
            gateway: None,
        })
        .await
        .unwrap();

    harness.dispatch_until_idle().await;

    let cancelled = harness.services.orders.get(order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // Stock untouched (the deduction was all-or-nothing).
    let stock = harness
        .services
        .inventory
        .get(ProductId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stock.quantity, 1);

    // The point portion came back.
    let balance = harness.services.points.balance(user).await.unwrap();
    assert_eq!(balance.balance, 100_000);

    assert!(harness.stores.all_dlq().is_empty());
}

/// The delivery lifecycle closes the order: DELIVERED publishes
/// `DeliveryCompleted`, the order completes, and the subscriber hears
/// about it.
#[tokio::test]
async fn delivered_orders_complete() {
    let harness = Harness::new();
    let user = UserId::new(1);

    harness.stores.seed_balance(user, 50_000);
    harness
        .services
        .inventory
        .set_stock(ProductId::new(1), 5)
        .await
        .unwrap();

    let order = harness
        .services
        .orders
        .create_order(user, vec![item(1, 10_000, 1)], vec![])
        .await
        .unwrap();
    harness
        .services
        .payments
        .process(PaymentRequest {
            order_id: order.id,
            user_id: user,
            method: PaymentMethod::Balance,
            point_amount: 10_000,
            gateway_amount: 0,
            gateway: None,
        })
        .await
        .unwrap();
    harness.dispatch_until_idle().await;

    let mut notifications = harness.services.notifier.subscribe(user).await;

    harness
        .services
        .deliveries
        .update_status(order.id, user, DeliveryStatus::Shipped)
        .await
        .unwrap();
    harness
        .services
        .deliveries
        .update_status(order.id, user, DeliveryStatus::Delivered)
        .await
        .unwrap();
    harness.dispatch_until_idle().await;

    let completed = harness.services.orders.get(order.id).await.unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);

    let notification = notifications.try_recv().unwrap();
    assert_eq!(
        notification,
        Notification::OrderCompleted {
            user_id: user,
            order_id: order.id,
        }
    );
}

/// The whole outbox replayed N times produces the same aggregate state as
/// one replay: processed rows are closed, handlers are idempotent.
#[tokio::test]
async fn outbox_replay_is_idempotent() {
    let harness = Harness::new();
    let user = UserId::new(1);
    harness.stores.seed_balance(user, 50_000);
    harness
        .services
        .inventory
        .set_stock(ProductId::new(1), 10)
        .await
        .unwrap();

    let order = harness
        .services
        .orders
        .create_order(user, vec![item(1, 10_000, 2)], vec![])
        .await
        .unwrap();
    harness
        .services
        .payments
        .process(PaymentRequest {
            order_id: order.id,
            user_id: user,
            method: PaymentMethod::Balance,
            point_amount: 20_000,
            gateway_amount: 0,
            gateway: None,
        })
        .await
        .unwrap();

    for _ in 0..5 {
        harness.dispatch_until_idle().await;
    }

    let stock = harness
        .services
        .inventory
        .get(ProductId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stock.quantity, 8);
    assert_eq!(
        harness
            .kv
            .realtime_count(StatKind::Sale, ProductId::new(1))
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        harness.services.points.balance(user).await.unwrap().balance,
        30_000
    );
}
