//! Typed realtime notifications delivered to subscribed clients.

use crate::error::Result;
use crate::ids::{CouponId, OrderId, UserId};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// A notification pushed to a user's live subscriptions (SSE).
///
/// The wire shape is `{"type": "...", ...}`; the SSE event name comes from
/// [`Notification::event_name`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Notification {
    /// Subscription established.
    Connected {
        /// The subscribed user.
        user_id: UserId,
    },
    /// A coupon issue became durable.
    CouponIssued {
        /// The holder.
        user_id: UserId,
        /// The coupon.
        coupon_id: CouponId,
    },
    /// An order finished fulfilment.
    OrderCompleted {
        /// The user.
        user_id: UserId,
        /// The order.
        order_id: OrderId,
    },
    /// A payment fully settled.
    PaymentCompleted {
        /// The user.
        user_id: UserId,
        /// The order.
        order_id: OrderId,
        /// Amount settled.
        amount: i64,
    },
}

impl Notification {
    /// The SSE event name.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::CouponIssued { .. } => "coupon-issued",
            Self::OrderCompleted { .. } => "order-completed",
            Self::PaymentCompleted { .. } => "payment-completed",
        }
    }

    /// The receiving user.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        match self {
            Self::Connected { user_id }
            | Self::CouponIssued { user_id, .. }
            | Self::OrderCompleted { user_id, .. }
            | Self::PaymentCompleted { user_id, .. } => *user_id,
        }
    }
}

/// Cross-instance notification fan-out (memory-store pub/sub).
///
/// Publishing is best-effort; each instance's subscriber task forwards
/// received notifications into its local registry.
pub trait NotificationBus: Send + Sync {
    /// Publish a notification to the user's channel.
    fn publish(
        &self,
        notification: &Notification,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Single-instance deployments have nowhere to fan out to.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotificationBus;

impl NotificationBus for NoopNotificationBus {
    async fn publish(&self, _notification: &Notification) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_uses_kebab_case_tags() {
        let json = serde_json::to_value(Notification::CouponIssued {
            user_id: UserId::new(1),
            coupon_id: CouponId::new(7),
        })
        .unwrap();
        assert_eq!(json["type"], "coupon-issued");
        assert_eq!(json["couponId"], 7);
        assert_eq!(json["userId"], 1);
    }

    #[test]
    fn event_names_match_sse_contract() {
        assert_eq!(
            Notification::Connected {
                user_id: UserId::new(1)
            }
            .event_name(),
            "connected"
        );
        assert_eq!(
            Notification::PaymentCompleted {
                user_id: UserId::new(1),
                order_id: OrderId::new(1),
                amount: 1000
            }
            .event_name(),
            "payment-completed"
        );
    }
}
