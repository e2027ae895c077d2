//! Shared fixtures for service and dispatcher tests.

use chrono::{TimeZone, Utc};
use storefront_core::coupon::{Coupon, DiscountType};
use storefront_core::ids::{CouponId, ProductId};
use storefront_core::order::OrderItem;

/// A plain order item for `product` at `unit_price`, no gift wrap.
#[must_use]
pub fn item(product: i64, unit_price: i64, quantity: u32) -> OrderItem {
    OrderItem {
        product_id: ProductId::new(product),
        product_name: format!("product-{product}"),
        unit_price,
        quantity,
        gift_wrap: false,
        gift_wrap_price: 0,
    }
}

/// A fixed-amount coupon with a validity window wide enough for both the
/// fixed test clock and the wall clock.
///
/// # Panics
///
/// Never; the hardcoded dates are valid.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn fixed_coupon(id: i64, discount: i64, total_quantity: i64) -> Coupon {
    Coupon {
        id: CouponId::new(id),
        code: format!("COUPON-{id}"),
        discount_type: DiscountType::Fixed,
        discount_value: discount,
        min_order_amount: 0,
        total_quantity,
        issued_quantity: 0,
        valid_from: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        valid_to: Utc.with_ymd_and_hms(2035, 1, 1, 0, 0, 0).unwrap(),
        version: 0,
    }
}
