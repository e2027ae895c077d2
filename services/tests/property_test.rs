//! Property tests: conservation and non-negativity of balances under
//! arbitrary operation sequences.

#![allow(clippy::unwrap_used)]

mod common;

use common::Harness;
use proptest::prelude::*;
use storefront_core::ids::{OrderId, UserId};

#[derive(Clone, Debug)]
enum PointOp {
    Charge(i64),
    Deduct(i64),
    Refund { amount: i64, order: i64 },
}

fn op_strategy() -> impl Strategy<Value = PointOp> {
    prop_oneof![
        (10_i64..=10_000).prop_map(|n| PointOp::Charge(n * 100)),
        (1_i64..=5_000).prop_map(|n| PointOp::Deduct(n * 100)),
        ((1_i64..=50), (1_i64..=5)).prop_map(|(n, order)| PointOp::Refund {
            amount: n * 100,
            order,
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Whatever sequence of charges, deducts and refunds completes (some
    /// will be rejected by the amount rules, limits or the balance), the
    /// final balance equals the sum of history amounts, never goes
    /// negative, and every history row is internally consistent.
    #[test]
    fn conservation_holds_under_random_ops(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let harness = Harness::new();
            let user = UserId::new(1);
            let points = &harness.services.points;

            for op in ops {
                // Domain rejections are expected; conservation must hold
                // either way.
                let _ = match op {
                    PointOp::Charge(amount) => points.charge(user, amount, "prop").await,
                    PointOp::Deduct(amount) => points.deduct(user, amount, None, "prop").await,
                    PointOp::Refund { amount, order } => {
                        points.refund(user, amount, OrderId::new(order)).await
                    }
                };
            }

            let histories = harness.stores.all_histories(user);
            let sum: i64 = histories.iter().map(|h| h.amount).sum();
            let balance = points
                .balance(user)
                .await
                .map_or(0, |b| b.balance);

            assert_eq!(balance, sum);
            assert!(balance >= 0);
            for h in &histories {
                assert_eq!(h.balance_after, h.balance_before + h.amount);
                assert!(h.balance_after >= 0);
            }
        });
    }
}
