//! Frozen memory-store key taxonomy.
//!
//! Keys are partitioned by owning component; components must not touch
//! another component's prefix:
//!
//! - `ecom:stat:*` — statistics aggregator
//! - `ecom:cpn:iss:*` — coupon issuance engine
//! - `ecom:lock:*` — distributed lock manager
//! - `ecom:cache:*` — read-path caches
//! - `ecom:notify:*` — cross-instance notification channels

use crate::ids::{CouponId, ProductId, UserId};
use crate::stats::StatKind;

/// Realtime statistic counter: `ecom:stat:rt:{view|sales|wish}:{productId}`.
#[must_use]
pub fn stat_counter(kind: StatKind, product_id: ProductId) -> String {
    format!("ecom:stat:rt:{}:{product_id}", kind.key_segment())
}

/// Per-hour statistics log list: `ecom:stat:log:{hour}`.
#[must_use]
pub fn stat_log(hour: i64) -> String {
    format!("ecom:stat:log:{hour}")
}

/// Scratch key the hour log is renamed to during a fold.
#[must_use]
pub fn stat_log_scratch(hour: i64) -> String {
    format!("ecom:stat:log:{hour}:fold")
}

/// Admitted-users set: `ecom:cpn:iss:issued:{couponId}`.
#[must_use]
pub fn coupon_issued_set(coupon_id: CouponId) -> String {
    format!("ecom:cpn:iss:issued:{coupon_id}")
}

/// Pending-issue queue (sorted set): `ecom:cpn:iss:queue:{couponId}`.
#[must_use]
pub fn coupon_queue(coupon_id: CouponId) -> String {
    format!("ecom:cpn:iss:queue:{coupon_id}")
}

/// Admission counter: `ecom:cpn:iss:cnt:{couponId}`.
#[must_use]
pub fn coupon_counter(coupon_id: CouponId) -> String {
    format!("ecom:cpn:iss:cnt:{coupon_id}")
}

/// Soldout flag: `ecom:cpn:iss:soldout:{couponId}`.
#[must_use]
pub fn coupon_soldout(coupon_id: CouponId) -> String {
    format!("ecom:cpn:iss:soldout:{coupon_id}")
}

/// Quantity cap: `ecom:cpn:iss:max:{couponId}`.
#[must_use]
pub fn coupon_max(coupon_id: CouponId) -> String {
    format!("ecom:cpn:iss:max:{coupon_id}")
}

/// Lease lock: `ecom:lock:{domain}:{key}`, domain ∈ {ord, pt, cpn, inv, pay}.
#[must_use]
pub fn lock(domain: &str, key: impl std::fmt::Display) -> String {
    format!("ecom:lock:{domain}:{key}")
}

/// Per-user point lock.
#[must_use]
pub fn point_lock(user_id: UserId) -> String {
    lock("pt", user_id)
}

/// Per-order payment lock.
#[must_use]
pub fn payment_lock(order_id: crate::ids::OrderId) -> String {
    lock("pay", order_id)
}

/// Per-coupon drain lock.
#[must_use]
pub fn coupon_lock(coupon_id: CouponId) -> String {
    lock("cpn", coupon_id)
}

/// Statistics fold lock.
#[must_use]
pub fn stat_fold_lock() -> String {
    lock("stat", "fold")
}

/// Popular-products cache: `ecom:cache:popular:{limit}`.
#[must_use]
pub fn cache_popular(limit: usize) -> String {
    format!("ecom:cache:popular:{limit}")
}

/// Cross-instance notification channel for a user.
#[must_use]
pub fn notify_channel(user_id: UserId) -> String {
    format!("ecom:notify:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_is_frozen() {
        assert_eq!(
            stat_counter(StatKind::Sale, ProductId::new(42)),
            "ecom:stat:rt:sales:42"
        );
        assert_eq!(stat_log(481_000), "ecom:stat:log:481000");
        assert_eq!(stat_log_scratch(481_000), "ecom:stat:log:481000:fold");
        assert_eq!(coupon_issued_set(CouponId::new(7)), "ecom:cpn:iss:issued:7");
        assert_eq!(coupon_queue(CouponId::new(7)), "ecom:cpn:iss:queue:7");
        assert_eq!(coupon_counter(CouponId::new(7)), "ecom:cpn:iss:cnt:7");
        assert_eq!(coupon_soldout(CouponId::new(7)), "ecom:cpn:iss:soldout:7");
        assert_eq!(point_lock(UserId::new(1)), "ecom:lock:pt:1");
        assert_eq!(cache_popular(10), "ecom:cache:popular:10");
        assert_eq!(notify_channel(UserId::new(1)), "ecom:notify:1");
    }
}
