//! Outbox dispatcher: claims unprocessed events and routes them to
//! handlers, with retries and dead-lettering.
//!
//! A cycle:
//!
//! 1. **Claim** up to `batch_size` unprocessed events ordered by id. FIFO
//!    per aggregate follows from the monotonic id; global FIFO is not a
//!    guarantee.
//! 2. **Group** the batch by event type, preserving id order within each
//!    group.
//! 3. **Resolve** the ordered handler list per type. No handler at all →
//!    straight to the DLQ.
//! 4. **Dispatch**: batch-capable handlers receive the whole per-type slice
//!    (all-or-nothing outcome); the rest are invoked per event. An event
//!    succeeds iff every handler succeeded.
//! 5. **Record**: success marks the row processed; failure increments the
//!    retry count, and once the budget (`MAX_RETRY`) is exhausted the event
//!    moves to the DLQ.
//!
//! Handler errors are contained per event; store errors abort the cycle and
//! surface to the worker loop, which logs and waits for the next tick.

use crate::registry::HandlerRegistry;
use std::sync::Arc;
use std::time::Duration;
use storefront_core::error::{CommerceError, Result};
use storefront_core::outbox::{DISPATCH_BATCH_SIZE, MAX_RETRY, OutboxEvent};
use storefront_core::store::OutboxStore;
use tokio::sync::watch;

/// Outcome counters for one dispatch cycle.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Events claimed this cycle.
    pub claimed: usize,
    /// Events whose every handler succeeded.
    pub succeeded: usize,
    /// Events left unprocessed for a later retry.
    pub retried: usize,
    /// Events moved to the DLQ.
    pub dead_lettered: usize,
}

/// Polls the outbox and drives events through the handler registry.
pub struct OutboxDispatcher<S> {
    store: Arc<S>,
    registry: Arc<HandlerRegistry>,
    batch_size: usize,
}

impl<S> OutboxDispatcher<S>
where
    S: OutboxStore,
{
    /// Create a dispatcher with the default batch size.
    #[must_use]
    pub fn new(store: Arc<S>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            store,
            registry,
            batch_size: DISPATCH_BATCH_SIZE,
        }
    }

    /// Override the claim batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Run one claim/dispatch/record cycle.
    ///
    /// # Errors
    ///
    /// Returns store errors (claim or outcome recording); handler failures
    /// are recorded per event and do not abort the cycle.
    pub async fn run_cycle(&self) -> Result<CycleStats> {
        let events = self.store.fetch_unprocessed(self.batch_size).await?;
        let mut stats = CycleStats {
            claimed: events.len(),
            ..CycleStats::default()
        };
        if events.is_empty() {
            return Ok(stats);
        }

        // Partition by event type, keeping id order inside each group.
        let mut groups: Vec<(String, Vec<OutboxEvent>)> = Vec::new();
        for event in events {
            match groups.iter_mut().find(|(t, _)| *t == event.event_type) {
                Some((_, group)) => group.push(event),
                None => groups.push((event.event_type.clone(), vec![event])),
            }
        }

        for (event_type, group) in groups {
            let handlers = self.registry.handlers_for(&event_type);
            if handlers.is_empty() {
                tracing::warn!(
                    event_type = event_type.as_str(),
                    count = group.len(),
                    "no handler registered; dead-lettering"
                );
                for event in &group {
                    self.dead_letter(event, "no handler registered", &mut stats)
                        .await?;
                }
                continue;
            }

            // One failure slot per event; the first error wins.
            let mut failures: Vec<Option<String>> = vec![None; group.len()];
            for handler in handlers {
                if handler.supports_batch() {
                    if let Err(e) = handler.handle_batch(&group).await {
                        let message = format!("{}: {e}", handler.name());
                        for slot in &mut failures {
                            if slot.is_none() {
                                *slot = Some(message.clone());
                            }
                        }
                    }
                } else {
                    for (i, event) in group.iter().enumerate() {
                        if failures[i].is_some() {
                            continue;
                        }
                        if let Err(e) = handler.handle(event).await {
                            failures[i] = Some(format!("{}: {e}", handler.name()));
                        }
                    }
                }
            }

            for (event, failure) in group.iter().zip(failures) {
                match failure {
                    None => self.mark_success(event, &mut stats).await?,
                    Some(error) => self.record_failure(event, &error, &mut stats).await?,
                }
            }
        }

        if stats.succeeded + stats.retried + stats.dead_lettered > 0 {
            tracing::info!(
                claimed = stats.claimed,
                succeeded = stats.succeeded,
                retried = stats.retried,
                dead_lettered = stats.dead_lettered,
                "dispatch cycle finished"
            );
        }
        Ok(stats)
    }

    /// Run the 5-second poll loop until a shutdown signal arrives.
    pub async fn run(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!("outbox dispatcher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        tracing::error!(error = %e, "dispatch cycle aborted");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("outbox dispatcher stopped");
                        break;
                    }
                }
            }
        }
    }

    async fn mark_success(&self, event: &OutboxEvent, stats: &mut CycleStats) -> Result<()> {
        match self.store.mark_processed(event.id).await {
            Ok(()) => {
                stats.succeeded += 1;
                metrics::counter!("outbox.dispatched", "event_type" => event.event_type.clone())
                    .increment(1);
                Ok(())
            }
            // Another instance won the race; the event is done either way.
            Err(CommerceError::AlreadyProcessed { event_id }) => {
                tracing::warn!(event_id, "event was already marked processed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn record_failure(
        &self,
        event: &OutboxEvent,
        error: &str,
        stats: &mut CycleStats,
    ) -> Result<()> {
        if event.retry_count >= MAX_RETRY {
            return self.dead_letter(event, error, stats).await;
        }

        let retry_count = self.store.record_failure(event.id, error).await?;
        stats.retried += 1;
        tracing::warn!(
            event_id = event.id,
            event_type = event.event_type.as_str(),
            retry_count,
            error,
            "event dispatch failed; will retry"
        );
        Ok(())
    }

    async fn dead_letter(
        &self,
        event: &OutboxEvent,
        error: &str,
        stats: &mut CycleStats,
    ) -> Result<()> {
        let dlq_id = self.store.move_to_dlq(event, error).await?;
        stats.dead_lettered += 1;
        tracing::error!(
            event_id = event.id,
            event_type = event.event_type.as_str(),
            dlq_id,
            retry_count = event.retry_count,
            error,
            "event moved to dead letter queue"
        );
        metrics::counter!("outbox.dead_lettered", "event_type" => event.event_type.clone())
            .increment(1);
        Ok(())
    }
}
