//! Point engine scenarios: concurrent charges, conservation, refund
//! idempotency and the amount rules.

#![allow(clippy::unwrap_used)]

mod common;

use common::Harness;
use futures::future::join_all;
use std::sync::Arc;
use storefront_core::ids::{OrderId, UserId};
use storefront_core::point::BalanceHistoryType;

/// S5: 100 concurrent `charge(1000)` calls on a fresh user end at exactly
/// 100 000 with 100 EARN rows and no conflict surfaced to any caller.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_concurrent_charges_serialize() {
    let harness = Harness::new();
    let user = UserId::new(1);

    let tasks: Vec<_> = (0..100)
        .map(|_| {
            let points = Arc::clone(&harness.services.points);
            tokio::spawn(async move { points.charge(user, 1_000, "concurrent charge").await })
        })
        .collect();

    for outcome in join_all(tasks).await {
        outcome.unwrap().unwrap();
    }

    let balance = harness.services.points.balance(user).await.unwrap();
    assert_eq!(balance.balance, 100_000);

    let histories = harness.stores.all_histories(user);
    assert_eq!(histories.len(), 100);
    assert!(
        histories
            .iter()
            .all(|h| h.history_type == BalanceHistoryType::Earn && h.amount == 1_000)
    );
}

/// Conservation: after any completed sequence of operations,
/// `balance == Σ history.amount` and no history row went negative.
#[tokio::test]
async fn balance_equals_history_sum() {
    let harness = Harness::new();
    let user = UserId::new(1);
    let points = &harness.services.points;

    points.charge(user, 50_000, "first").await.unwrap();
    points
        .deduct(user, 20_000, Some(OrderId::new(1)), "order")
        .await
        .unwrap();
    points.charge(user, 10_000, "second").await.unwrap();
    points.refund(user, 20_000, OrderId::new(1)).await.unwrap();
    points
        .deduct(user, 5_000, None, "manual")
        .await
        .unwrap();

    let balance = points.balance(user).await.unwrap();
    let histories = harness.stores.all_histories(user);
    let sum: i64 = histories.iter().map(|h| h.amount).sum();
    assert_eq!(balance.balance, sum);
    assert_eq!(balance.balance, 55_000);
    assert!(histories.iter().all(|h| h.balance_after >= 0));
    assert!(
        histories
            .iter()
            .all(|h| h.balance_after == h.balance_before + h.amount)
    );
}

/// Round-trip law: charge(a) then deduct(a) returns to the initial
/// balance.
#[tokio::test]
async fn charge_then_deduct_roundtrips() {
    let harness = Harness::new();
    let user = UserId::new(1);
    let points = &harness.services.points;

    points.charge(user, 10_000, "seed").await.unwrap();
    let initial = points.balance(user).await.unwrap().balance;

    points.charge(user, 5_000, "charge").await.unwrap();
    points.deduct(user, 5_000, None, "deduct").await.unwrap();
    assert_eq!(points.balance(user).await.unwrap().balance, initial);
}

/// Two refunds for the same `(user, order)` are equivalent to one.
#[tokio::test]
async fn refund_is_idempotent_per_order() {
    let harness = Harness::new();
    let user = UserId::new(1);
    let order = OrderId::new(9);
    let points = &harness.services.points;

    points.charge(user, 50_000, "seed").await.unwrap();
    points
        .deduct(user, 20_000, Some(order), "payment")
        .await
        .unwrap();

    points.refund(user, 20_000, order).await.unwrap();
    points.refund(user, 20_000, order).await.unwrap();

    assert_eq!(points.balance(user).await.unwrap().balance, 50_000);
    let refunds = harness
        .stores
        .all_histories(user)
        .into_iter()
        .filter(|h| h.history_type == BalanceHistoryType::Refund)
        .count();
    assert_eq!(refunds, 1);
}

#[tokio::test]
async fn charge_amount_rules_are_enforced() {
    let harness = Harness::new();
    let user = UserId::new(1);
    let points = &harness.services.points;

    assert_eq!(
        points.charge(user, 999, "below minimum").await.unwrap_err().code(),
        "POINT003"
    );
    assert_eq!(
        points
            .charge(user, 1_000_001, "above maximum")
            .await
            .unwrap_err()
            .code(),
        "POINT003"
    );
    assert_eq!(
        points
            .charge(user, 1_050, "off the unit grid")
            .await
            .unwrap_err()
            .code(),
        "POINT003"
    );
}

#[tokio::test]
async fn deduct_amount_rules_are_enforced() {
    let harness = Harness::new();
    let user = UserId::new(1);
    let points = &harness.services.points;
    points.charge(user, 10_000, "seed").await.unwrap();

    assert_eq!(
        points.deduct(user, 50, None, "tiny").await.unwrap_err().code(),
        "POINT005"
    );
    assert_eq!(
        points
            .deduct(user, 150, None, "off grid")
            .await
            .unwrap_err()
            .code(),
        "POINT003"
    );
    assert_eq!(
        points
            .deduct(user, 20_000, None, "too much")
            .await
            .unwrap_err()
            .code(),
        "POINT001"
    );
}

#[tokio::test]
async fn max_balance_is_a_ceiling() {
    let harness = Harness::new();
    let user = UserId::new(1);
    harness.stores.seed_balance(user, 9_900_000);

    let err = harness
        .services
        .points
        .charge(user, 200_000, "over the top")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "POINT002");
    assert_eq!(
        harness.services.points.balance(user).await.unwrap().balance,
        9_900_000
    );
}

#[tokio::test]
async fn deduct_for_unknown_user_is_point004() {
    let harness = Harness::new();
    let err = harness
        .services
        .points
        .deduct(UserId::new(404), 1_000, None, "ghost")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "POINT004");
}

#[tokio::test]
async fn histories_are_newest_first_and_capped() {
    let harness = Harness::new();
    let user = UserId::new(1);
    let points = &harness.services.points;

    for _ in 0..105 {
        points.charge(user, 1_000, "one of many").await.unwrap();
    }
    let histories = points.histories(user).await.unwrap();
    assert_eq!(histories.len(), 100);
    assert!(histories.windows(2).all(|w| w[0].id > w[1].id));
}

#[tokio::test]
async fn daily_deduct_limit_is_enforced() {
    let harness = Harness::new();
    let user = UserId::new(1);
    harness.stores.seed_balance(user, 5_000_000);
    let points = &harness.services.points;

    points
        .deduct(user, 1_000_000, None, "big spender")
        .await
        .unwrap();
    let err = points.deduct(user, 100, None, "one more").await.unwrap_err();
    assert_eq!(err.code(), "PAYMENT005");
}
