//! Limited-coupon issuance scenarios: the 2000-way admission race, FIFO
//! drain, re-queue on drain failure and restore compensation.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::Harness;
use futures::future::join_all;
use std::sync::Arc;
use storefront_core::coupon::{AdmissionOutcome, UserCouponStatus};
use storefront_core::ids::{CouponId, UserId};
use storefront_core::memstore::CouponAdmissionStore;
use storefront_testing::fixtures::fixed_coupon;

/// S4: coupon 7 with 100 units, 2000 concurrent distinct users. Exactly
/// 100 admissions with positions 1..=100, 1900 SOLD_OUT; after the drain
/// exactly 100 ISSUED rows, in admission order.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_thousand_requests_issue_exactly_one_hundred() {
    let harness = Harness::new();
    let coupon = CouponId::new(7);
    harness.stores.seed_coupon(fixed_coupon(7, 5_000, 100));

    let tasks: Vec<_> = (1..=2000_i64)
        .map(|user| {
            let issue = Arc::clone(&harness.services.coupon_issue);
            tokio::spawn(async move { issue.request_issue(coupon, UserId::new(user)).await })
        })
        .collect();

    let mut accepted_positions = Vec::new();
    let mut sold_out = 0;
    for outcome in join_all(tasks).await {
        match outcome.unwrap().unwrap() {
            AdmissionOutcome::Accepted { position } => accepted_positions.push(position),
            AdmissionOutcome::SoldOut => sold_out += 1,
            AdmissionOutcome::AlreadyIssued => panic!("users are distinct"),
        }
    }

    assert_eq!(accepted_positions.len(), 100);
    assert_eq!(sold_out, 1900);
    accepted_positions.sort_unstable();
    assert_eq!(accepted_positions, (1..=100_i64).collect::<Vec<_>>());

    // Drain everything (one tick handles DRAIN_BATCH=100).
    let stats = harness.services.coupon_issue.drain_all().await.unwrap();
    assert_eq!(stats.issued, 100);

    let rows = harness.stores.all_user_coupons(coupon);
    assert_eq!(rows.len(), 100);
    assert!(rows.iter().all(|r| r.status == UserCouponStatus::Issued));
    assert_eq!(
        harness.services.coupons.issued_count(coupon).await.unwrap(),
        100
    );

    // FIFO: durable rows are created in queue (admission) order.
    assert!(rows.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn duplicate_user_is_rejected_without_consuming_quantity() {
    let harness = Harness::new();
    let coupon = CouponId::new(7);
    harness.stores.seed_coupon(fixed_coupon(7, 5_000, 10));
    let issue = &harness.services.coupon_issue;

    assert!(matches!(
        issue.request_issue(coupon, UserId::new(1)).await.unwrap(),
        AdmissionOutcome::Accepted { position: 1 }
    ));
    assert_eq!(
        issue.request_issue(coupon, UserId::new(1)).await.unwrap(),
        AdmissionOutcome::AlreadyIssued
    );
    assert_eq!(harness.kv.counter(coupon).await.unwrap(), 1);
}

#[tokio::test]
async fn sold_out_flag_short_circuits_after_exhaustion() {
    let harness = Harness::new();
    let coupon = CouponId::new(7);
    harness.stores.seed_coupon(fixed_coupon(7, 5_000, 1));
    let issue = &harness.services.coupon_issue;

    assert!(matches!(
        issue.request_issue(coupon, UserId::new(1)).await.unwrap(),
        AdmissionOutcome::Accepted { .. }
    ));
    assert_eq!(
        issue.request_issue(coupon, UserId::new(2)).await.unwrap(),
        AdmissionOutcome::SoldOut
    );
    // The flag is set now; later requests reject on the first gate.
    assert!(harness.kv.is_sold_out(coupon).await.unwrap());
    assert_eq!(
        issue.request_issue(coupon, UserId::new(3)).await.unwrap(),
        AdmissionOutcome::SoldOut
    );
}

/// A failing durable insert re-queues the entry with its original score,
/// so the next drain issues in the original order.
#[tokio::test]
async fn drain_failure_requeues_and_preserves_fifo() {
    let harness = Harness::new();
    let coupon = CouponId::new(7);
    // The coupon is admitted in the fast path but missing durably, so the
    // insert fails with CouponNotFound and the entry is re-queued.
    harness.kv.activate(coupon, 10).await.unwrap();

    let issue = &harness.services.coupon_issue;
    assert!(matches!(
        issue.request_issue(coupon, UserId::new(1)).await.unwrap(),
        AdmissionOutcome::Accepted { position: 1 }
    ));
    assert!(matches!(
        issue.request_issue(coupon, UserId::new(2)).await.unwrap(),
        AdmissionOutcome::Accepted { position: 2 }
    ));

    let stats = issue.drain(coupon).await.unwrap();
    assert_eq!(stats.popped, 2);
    assert_eq!(stats.issued, 0);
    assert_eq!(stats.requeued, 2);
    assert_eq!(harness.kv.queue_len(coupon).await.unwrap(), 2);

    // The durable definition appears; the next drain succeeds in order.
    harness.stores.seed_coupon(fixed_coupon(7, 5_000, 10));
    let stats = issue.drain(coupon).await.unwrap();
    assert_eq!(stats.issued, 2);

    let rows = harness.stores.all_user_coupons(coupon);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].user_id, UserId::new(1));
    assert_eq!(rows[1].user_id, UserId::new(2));
}

/// Compensation: restore flips the row back to ISSUED, frees quantity,
/// clears the soldout flag — but never re-admits the user to the fast
/// path.
#[tokio::test]
async fn restore_reopens_quantity_without_readmitting_the_user() {
    let harness = Harness::new();
    let coupon = CouponId::new(7);
    harness.stores.seed_coupon(fixed_coupon(7, 5_000, 1));
    let issue = &harness.services.coupon_issue;
    let coupons = &harness.services.coupons;

    // User 1 takes the only unit.
    issue.request_issue(coupon, UserId::new(1)).await.unwrap();
    assert_eq!(issue.drain_all().await.unwrap().issued, 1);
    assert_eq!(
        issue.request_issue(coupon, UserId::new(2)).await.unwrap(),
        AdmissionOutcome::SoldOut
    );

    // Consume it, then compensate.
    coupons
        .use_for_order(
            UserId::new(1),
            coupon,
            storefront_core::ids::OrderId::new(1),
            uuid::Uuid::new_v4(),
        )
        .await
        .unwrap();
    coupons.restore(UserId::new(1), coupon).await.unwrap();

    let rows = harness.stores.all_user_coupons(coupon);
    assert_eq!(rows[0].status, UserCouponStatus::Issued);
    assert!(!harness.kv.is_sold_out(coupon).await.unwrap());

    // The original holder stays deduplicated out of the fast path.
    assert_eq!(
        issue.request_issue(coupon, UserId::new(1)).await.unwrap(),
        AdmissionOutcome::AlreadyIssued
    );
}

#[tokio::test]
async fn expired_coupons_cannot_be_requested() {
    let harness = Harness::new();
    let mut coupon = fixed_coupon(8, 1_000, 10);
    coupon.valid_to = coupon.valid_from; // window collapsed in the past
    harness.stores.seed_coupon(coupon);

    let err = harness
        .services
        .coupon_issue
        .request_issue(CouponId::new(8), UserId::new(1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "COUPON004");
}
