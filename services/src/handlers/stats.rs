//! Statistics handler: analytics consumer of confirmed orders.
//!
//! Batch-capable: the dispatcher hands it the whole per-type slice, which
//! turns N sale recordings into one pass (the outcome is all-or-nothing
//! for the slice, per the dispatcher contract).

use crate::stats::StatisticsService;
use std::sync::Arc;
use storefront_core::clock::Clock;
use storefront_core::error::Result;
use storefront_core::event::{DomainEvent, event_types};
use storefront_core::handler::{EventHandler, HandlerFuture};
use storefront_core::memstore::{CacheStore, StatsBuffer};
use storefront_core::outbox::OutboxEvent;
use storefront_core::store::{HandledEventStore, StatsStore};

/// Consumes `OrderConfirmed` and records a sale per line. Idempotency is
/// a dedup row per `(handler, event)` — statistic increments are not
/// otherwise replay-safe.
pub struct StatsEventHandler<S, K, C> {
    stats: Arc<StatisticsService<S, K, C>>,
    handled: S,
}

impl<S: Clone, K, C> StatsEventHandler<S, K, C> {
    /// Create the handler.
    pub const fn new(stats: Arc<StatisticsService<S, K, C>>, handled: S) -> Self {
        Self { stats, handled }
    }
}

impl<S, K, C> StatsEventHandler<S, K, C>
where
    S: StatsStore + HandledEventStore + Clone + 'static,
    K: StatsBuffer + CacheStore + 'static,
    C: Clock + 'static,
{
    async fn record_one(&self, event: &OutboxEvent) -> Result<()> {
        match event.domain_event()? {
            DomainEvent::OrderConfirmed(p) => {
                let fresh = self
                    .handled
                    .try_mark_handled("stats", &event.event_type, &event.aggregate_id, event.id)
                    .await?;
                if !fresh {
                    return Ok(());
                }
                for line in &p.items {
                    self.stats
                        .record_sale(line.product_id, i64::from(line.quantity))
                        .await?;
                }
                Ok(())
            }
            other => {
                tracing::debug!(
                    event_type = other.event_type(),
                    "stats handler ignoring event"
                );
                Ok(())
            }
        }
    }
}

impl<S, K, C> EventHandler for StatsEventHandler<S, K, C>
where
    S: StatsStore + HandledEventStore + Clone + 'static,
    K: StatsBuffer + CacheStore + 'static,
    C: Clock + 'static,
{
    fn name(&self) -> &'static str {
        "stats"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[event_types::ORDER_CONFIRMED]
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn handle<'a>(&'a self, event: &'a OutboxEvent) -> HandlerFuture<'a> {
        Box::pin(async move { self.record_one(event).await })
    }

    fn handle_batch<'a>(&'a self, events: &'a [OutboxEvent]) -> HandlerFuture<'a> {
        Box::pin(async move {
            for event in events {
                self.record_one(event).await?;
            }
            Ok(())
        })
    }
}
