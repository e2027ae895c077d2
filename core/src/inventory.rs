//! Inventory aggregate: per-product stock with optimistic versioning.

use crate::ids::ProductId;
use serde::{Deserialize, Serialize};

/// Stock row for one product. Invariant: `0 ≤ reserved_quantity ≤ quantity`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// The product.
    pub product_id: ProductId,
    /// Units on hand.
    pub quantity: i64,
    /// Units reserved for in-flight orders.
    pub reserved_quantity: i64,
    /// Optimistic version.
    pub version: i64,
}

impl Inventory {
    /// Units that can still be sold.
    #[must_use]
    pub const fn available(&self) -> i64 {
        self.quantity - self.reserved_quantity
    }
}

/// Outcome of an order-scoped stock deduction.
///
/// Deductions are recorded as movement rows with a unique key on
/// `(order_id, product_id, kind)`, so a redelivered `PaymentCompleted`
/// resolves to [`DeductionOutcome::AlreadyDeducted`] instead of deducting
/// twice (the natural-uniqueness idempotency strategy).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeductionOutcome {
    /// Stock was decremented for every line of the order.
    Deducted,
    /// Movement rows already existed; nothing changed.
    AlreadyDeducted,
}

/// Outcome of an order-scoped stock restore (compensation).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Stock was added back for every deducted line.
    Restored,
    /// Restore movements already existed; nothing changed.
    AlreadyRestored,
    /// The order never had stock deducted; nothing to restore.
    NothingDeducted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_subtracts_reservations() {
        let inv = Inventory {
            product_id: ProductId::new(42),
            quantity: 10,
            reserved_quantity: 3,
            version: 1,
        };
        assert_eq!(inv.available(), 7);
    }
}
