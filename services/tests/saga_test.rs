//! Payment saga scenarios: the mixed-tender happy path, insufficient
//! balance, gateway failure with compensation, and the post-gateway
//! conflict path.

#![allow(clippy::unwrap_used)]

mod common;

use common::Harness;
use std::sync::Arc;
use storefront_core::error::{CommerceError, Result};
use storefront_core::gateway::{
    GatewayCancelResponse, GatewayRequest, GatewayResponse, PaymentGateway,
};
use storefront_core::ids::UserId;
use storefront_core::order::{Order, OrderStatus};
use storefront_core::payment::{PaymentMethod, PaymentStatus};
use storefront_core::point::BalanceHistoryType;
use storefront_core::store::{BalanceStore, PaymentStore};
use storefront_services::payment::{GatewayCharge, PaymentRequest};
use storefront_testing::fixtures::item;

async fn order_of(harness: &Harness, user: i64, unit_price: i64, quantity: u32) -> Order {
    harness
        .services
        .orders
        .create_order(
            UserId::new(user),
            vec![item(1, unit_price, quantity)],
            vec![],
        )
        .await
        .unwrap()
}

fn mixed_request(order: &Order, point_amount: i64, gateway_amount: i64) -> PaymentRequest {
    PaymentRequest {
        order_id: order.id,
        user_id: order.user_id,
        method: PaymentMethod::Mixed,
        point_amount,
        gateway_amount,
        gateway: Some(GatewayCharge {
            provider: "TOSS".to_string(),
            method: "CARD".to_string(),
            card_number_masked: Some("****1234".to_string()),
        }),
    }
}

/// S1: user 1 has 50 000, order of 35 000 paid 20 000 points + 15 000
/// gateway. The receipt shows COMPLETED and balance 30 000; the order is
/// CONFIRMED; one USE history with before/after 50 000/30 000; one
/// `PaymentCompleted` outbox row; the downstream handlers all succeed.
#[tokio::test]
async fn mixed_payment_happy_path() {
    let harness = Harness::new();
    harness.stores.seed_balance(UserId::new(1), 50_000);
    harness
        .services
        .inventory
        .set_stock(storefront_core::ids::ProductId::new(1), 10)
        .await
        .unwrap();
    let order = order_of(&harness, 1, 17_500, 2).await; // final 35 000

    harness.gateway.script_success("toss_1");
    let receipt = harness
        .services
        .payments
        .process(mixed_request(&order, 20_000, 15_000))
        .await
        .unwrap();

    assert_eq!(receipt.payment.status, PaymentStatus::Completed);
    assert_eq!(receipt.payment.external_txn_id.as_deref(), Some("toss_1"));
    assert_eq!(receipt.balance_after, Some(30_000));

    let confirmed = harness.services.orders.get(order.id).await.unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);

    let balance = harness.stores.get_balance(UserId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.balance, 30_000);

    let histories = harness.stores.all_histories(UserId::new(1));
    let uses: Vec<_> = histories
        .iter()
        .filter(|h| h.history_type == BalanceHistoryType::Use)
        .collect();
    assert_eq!(uses.len(), 1);
    assert_eq!(uses[0].amount, -20_000);
    assert_eq!(uses[0].balance_before, 50_000);
    assert_eq!(uses[0].balance_after, 30_000);
    assert_eq!(uses[0].order_id, Some(order.id));

    let completed_rows: Vec<_> = harness
        .stores
        .all_outbox()
        .into_iter()
        .filter(|e| e.event_type == "PaymentCompleted")
        .collect();
    assert_eq!(completed_rows.len(), 1);

    // Downstream side effects all settle.
    harness.dispatch_until_idle().await;
    assert!(harness.stores.all_dlq().is_empty());
    assert!(
        harness
            .stores
            .all_outbox()
            .iter()
            .all(|e| e.processed && e.error_message.is_none())
    );
}

/// S2: balance 10 000, point request 20 000, gateway 0. POINT-side reject
/// (PAYMENT002 in the payment context), nothing written.
#[tokio::test]
async fn insufficient_balance_rejects_before_any_side_effect() {
    let harness = Harness::new();
    harness.stores.seed_balance(UserId::new(1), 10_000);
    let order = order_of(&harness, 1, 20_000, 1).await;

    let err = harness
        .services
        .payments
        .process(PaymentRequest {
            order_id: order.id,
            user_id: order.user_id,
            method: PaymentMethod::Balance,
            point_amount: 20_000,
            gateway_amount: 0,
            gateway: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PAYMENT002");

    let balance = harness.stores.get_balance(UserId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.balance, 10_000);
    assert!(
        harness
            .stores
            .get_payment_by_order(order.id)
            .await
            .unwrap()
            .is_none()
    );
    assert!(harness.gateway.requests().is_empty());
    assert!(
        !harness
            .stores
            .all_outbox()
            .iter()
            .any(|e| e.event_type == "PaymentCompleted" || e.event_type == "PaymentFailed")
    );
}

/// S3: balance 50 000, 20 000 points + 15 000 gateway, gateway declines.
/// PAYMENT003 surfaces, no debit, no USE history, and the published
/// `PaymentFailed` drives the order to FAILED.
#[tokio::test]
async fn gateway_decline_publishes_payment_failed() {
    let harness = Harness::new();
    harness.stores.seed_balance(UserId::new(1), 50_000);
    let order = order_of(&harness, 1, 35_000, 1).await;

    harness.gateway.script_decline("LIMIT_EXCEEDED");
    let err = harness
        .services
        .payments
        .process(mixed_request(&order, 20_000, 15_000))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PAYMENT003");

    let balance = harness.stores.get_balance(UserId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.balance, 50_000);
    assert!(
        !harness
            .stores
            .all_histories(UserId::new(1))
            .iter()
            .any(|h| h.history_type == BalanceHistoryType::Use)
    );

    harness.dispatch_until_idle().await;
    let failed = harness.services.orders.get(order.id).await.unwrap();
    assert_eq!(failed.status, OrderStatus::Failed);
}

#[tokio::test]
async fn amount_mismatch_is_rejected() {
    let harness = Harness::new();
    harness.stores.seed_balance(UserId::new(1), 50_000);
    let order = order_of(&harness, 1, 35_000, 1).await;

    let err = harness
        .services
        .payments
        .process(mixed_request(&order, 20_000, 10_000))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PAYMENT001");
    assert!(harness.gateway.requests().is_empty());
}

#[tokio::test]
async fn paying_twice_is_rejected() {
    let harness = Harness::new();
    harness.stores.seed_balance(UserId::new(1), 50_000);
    let order = order_of(&harness, 1, 10_000, 1).await;

    harness
        .services
        .payments
        .process(PaymentRequest {
            order_id: order.id,
            user_id: order.user_id,
            method: PaymentMethod::Balance,
            point_amount: 10_000,
            gateway_amount: 0,
            gateway: None,
        })
        .await
        .unwrap();

    let err = harness
        .services
        .payments
        .process(PaymentRequest {
            order_id: order.id,
            user_id: order.user_id,
            method: PaymentMethod::Balance,
            point_amount: 10_000,
            gateway_amount: 0,
            gateway: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PAYMENT004");
}

#[tokio::test]
async fn daily_limit_blocks_the_point_portion() {
    let harness = Harness::new();
    harness.stores.seed_balance(UserId::new(1), 5_000_000);

    // Use 1 000 000 today through a first order.
    let first = order_of(&harness, 1, 1_000_000, 1).await;
    harness
        .services
        .payments
        .process(PaymentRequest {
            order_id: first.id,
            user_id: first.user_id,
            method: PaymentMethod::Balance,
            point_amount: 1_000_000,
            gateway_amount: 0,
            gateway: None,
        })
        .await
        .unwrap();

    let second = order_of(&harness, 1, 10_000, 1).await;
    let err = harness
        .services
        .payments
        .process(PaymentRequest {
            order_id: second.id,
            user_id: second.user_id,
            method: PaymentMethod::Balance,
            point_amount: 10_000,
            gateway_amount: 0,
            gateway: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PAYMENT005");
}

/// A gateway that approves only after the test lets it proceed, so the
/// test can change the world mid-call.
#[derive(Clone)]
struct GatedGateway {
    proceed: Arc<tokio::sync::Notify>,
    started: Arc<tokio::sync::Notify>,
    cancels: Arc<std::sync::Mutex<Vec<String>>>,
}

impl GatedGateway {
    fn new() -> Self {
        Self {
            proceed: Arc::new(tokio::sync::Notify::new()),
            started: Arc::new(tokio::sync::Notify::new()),
            cancels: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }
}

impl PaymentGateway for GatedGateway {
    async fn request_payment(&self, _request: &GatewayRequest) -> Result<GatewayResponse> {
        self.started.notify_one();
        self.proceed.notified().await;
        Ok(GatewayResponse {
            success: true,
            transaction_id: Some("toss_gated".to_string()),
            error_code: None,
        })
    }

    async fn cancel_payment(&self, transaction_id: &str) -> Result<GatewayCancelResponse> {
        self.cancels.lock().unwrap().push(transaction_id.to_string());
        Ok(GatewayCancelResponse { success: true })
    }
}

/// The world changes during the gateway call (the order gets cancelled);
/// the commit's guard misses and the saga compensates the gateway charge.
#[tokio::test]
async fn post_gateway_conflict_compensates_the_charge() {
    use storefront_testing::mocks::{InMemoryLockManager, MemoryKv, MemoryStores, test_clock};

    let stores = MemoryStores::new(test_clock());
    let gateway = GatedGateway::new();
    let services = Arc::new(storefront_services::Services::new(
        stores.clone(),
        MemoryKv::new(),
        InMemoryLockManager::new(),
        gateway.clone(),
        test_clock(),
    ));

    stores.seed_balance(UserId::new(1), 50_000);
    let order = services
        .orders
        .create_order(UserId::new(1), vec![item(1, 35_000, 1)], vec![])
        .await
        .unwrap();

    let saga = Arc::clone(&services);
    let order_id = order.id;
    let in_flight = tokio::spawn(async move {
        saga.payments
            .process(PaymentRequest {
                order_id,
                user_id: UserId::new(1),
                method: PaymentMethod::Mixed,
                point_amount: 20_000,
                gateway_amount: 15_000,
                gateway: Some(GatewayCharge {
                    provider: "TOSS".to_string(),
                    method: "CARD".to_string(),
                    card_number_masked: None,
                }),
            })
            .await
    });

    // Wait for the saga to reach the gateway, cancel the order under it,
    // then let the gateway approve.
    gateway.started.notified().await;
    services
        .orders
        .cancel(order.id, "changed my mind", uuid::Uuid::new_v4())
        .await
        .unwrap();
    gateway.proceed.notify_one();

    let err = in_flight.await.unwrap().unwrap_err();
    assert_eq!(err.code(), "CONFLICT001");

    // Compensation reversed the gateway charge; the balance never moved.
    assert_eq!(
        gateway.cancels.lock().unwrap().clone(),
        vec!["toss_gated".to_string()]
    );
    let balance = stores.get_balance(UserId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.balance, 50_000);
}
