//! Cross-instance notification fan-out over Redis pub/sub.
//!
//! Publishers write to `ecom:notify:{userId}`; every instance runs one
//! subscriber task (`PSUBSCRIBE ecom:notify:*`) that forwards received
//! notifications into its local registry via a channel.

use crate::mem_err;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use storefront_core::error::{CommerceError, Result};
use storefront_core::keys;
use storefront_core::notify::{Notification, NotificationBus};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Redis pub/sub notification bus.
#[derive(Clone)]
pub struct RedisNotificationBus {
    conn: ConnectionManager,
}

impl RedisNotificationBus {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::MemoryStore`] when the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| mem_err(&e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(Self { conn })
    }

    /// Spawn the subscriber task: received notifications are forwarded to
    /// `sink` (the server drains it into the local registry). The task
    /// exits on shutdown or when the sink closes.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::MemoryStore`] when the pub/sub connection
    /// cannot be established.
    pub async fn spawn_subscriber(
        redis_url: &str,
        sink: mpsc::UnboundedSender<Notification>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>> {
        let client = Client::open(redis_url).map_err(|e| mem_err(&e))?;
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| mem_err(&e))?;
        pubsub
            .psubscribe("ecom:notify:*")
            .await
            .map_err(|e| mem_err(&e))?;

        Ok(tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            tracing::info!("notification subscriber started");
            loop {
                tokio::select! {
                    message = messages.next() => {
                        let Some(message) = message else {
                            tracing::warn!("notification pub/sub stream ended");
                            break;
                        };
                        let payload: String = match message.get_payload() {
                            Ok(payload) => payload,
                            Err(e) => {
                                tracing::warn!(error = %e, "unreadable notification payload");
                                continue;
                            }
                        };
                        match serde_json::from_str::<Notification>(&payload) {
                            Ok(notification) => {
                                if sink.send(notification).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "malformed notification payload");
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            tracing::info!("notification subscriber stopped");
                            break;
                        }
                    }
                }
            }
        }))
    }
}

impl NotificationBus for RedisNotificationBus {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(notification)
            .map_err(|e| CommerceError::Serialization(e.to_string()))?;
        let _: i64 = conn
            .publish(keys::notify_channel(notification.user_id()), payload)
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(())
    }
}
