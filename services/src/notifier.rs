//! Per-user realtime subscription registry.
//!
//! Each subscribed user gets a broadcast channel; downstream handlers push
//! typed [`Notification`]s that are delivered best-effort to whichever
//! subscribers are connected to this instance. Cross-instance fan-out goes
//! through a [`storefront_core::notify::NotificationBus`] (memory-store
//! pub/sub) whose subscriber task feeds this registry.

use std::collections::HashMap;
use std::sync::Arc;
use storefront_core::ids::UserId;
use storefront_core::notify::Notification;
use tokio::sync::{RwLock, broadcast};

/// Buffered notifications per subscriber before lagging ones are dropped.
const CHANNEL_CAPACITY: usize = 32;

/// Process-local registry of per-user notification channels.
#[derive(Default)]
pub struct NotifierRegistry {
    channels: RwLock<HashMap<i64, broadcast::Sender<Notification>>>,
}

impl NotifierRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, ready to hand to handlers and the HTTP layer.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Subscribe to a user's notifications.
    pub async fn subscribe(&self, user_id: UserId) -> broadcast::Receiver<Notification> {
        let mut channels = self.channels.write().await;
        channels
            .entry(user_id.value())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver a notification to the user's subscribers on this instance.
    /// Returns how many subscribers received it; zero is not an error.
    pub async fn notify(&self, notification: &Notification) -> usize {
        let user = notification.user_id();
        let delivered = {
            let channels = self.channels.read().await;
            channels
                .get(&user.value())
                .map_or(0, |sender| sender.send(notification.clone()).unwrap_or(0))
        };
        if delivered == 0 {
            tracing::debug!(user_id = %user, event = notification.event_name(), "no live subscribers");
        }
        delivered
    }

    /// Drop channels with no remaining subscribers.
    pub async fn prune(&self) {
        let mut channels = self.channels.write().await;
        channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    /// Number of users with a live channel (for tests).
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use storefront_core::ids::OrderId;

    #[tokio::test]
    async fn subscriber_receives_notifications() {
        let registry = NotifierRegistry::new();
        let mut rx = registry.subscribe(UserId::new(1)).await;

        let notification = Notification::PaymentCompleted {
            user_id: UserId::new(1),
            order_id: OrderId::new(9),
            amount: 35_000,
        };
        assert_eq!(registry.notify(&notification).await, 1);
        assert_eq!(rx.recv().await.unwrap(), notification);
    }

    #[tokio::test]
    async fn notifications_do_not_cross_users() {
        let registry = NotifierRegistry::new();
        let mut rx = registry.subscribe(UserId::new(1)).await;

        registry
            .notify(&Notification::Connected {
                user_id: UserId::new(2),
            })
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn delivery_without_subscribers_is_best_effort() {
        let registry = NotifierRegistry::new();
        let delivered = registry
            .notify(&Notification::Connected {
                user_id: UserId::new(3),
            })
            .await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn prune_drops_dead_channels() {
        let registry = NotifierRegistry::new();
        let rx = registry.subscribe(UserId::new(1)).await;
        drop(rx);
        registry.prune().await;
        assert_eq!(registry.channel_count().await, 0);
    }
}
