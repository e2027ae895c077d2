//! Identifier newtypes for the domain aggregates.
//!
//! All identifiers are numeric (`i64`) database keys wrapped in newtypes so
//! they cannot be mixed up at call sites. The wrappers are `Copy` and
//! serialize transparently as their numeric value.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw database id.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// The raw numeric value.
            #[must_use]
            pub const fn value(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Unique identifier for a user.
    UserId
);
id_type!(
    /// Unique identifier for an order.
    OrderId
);
id_type!(
    /// Unique identifier for a product.
    ProductId
);
id_type!(
    /// Unique identifier for a coupon.
    CouponId
);
