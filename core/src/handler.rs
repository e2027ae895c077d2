//! Event handler contract for the outbox dispatcher.
//!
//! A handler is any value that advertises the event types it consumes, an
//! ordering priority, a batch capability flag, and the two handling entry
//! points. Handlers are held as trait objects by the registry, so the
//! methods return boxed futures (the same dyn-compatibility technique the
//! repository seams avoid by staying generic).
//!
//! # Idempotency discipline
//!
//! Delivery is at-least-once: every handler MUST treat redelivery as a
//! no-op. Pick one strategy per handler:
//!
//! - compare current state to target state (e.g. order already CONFIRMED →
//!   success);
//! - a dedup table keyed by `(handler, event_type, aggregate_id, event_id)`
//!   (see [`crate::store::HandledEventStore`]);
//! - natural uniqueness (INSERT with a unique key on the correlation).

use crate::error::Result;
use crate::outbox::OutboxEvent;
use std::future::Future;
use std::pin::Pin;

/// Boxed future alias for dyn-compatible handler methods.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A consumer of outbox events.
///
/// # Outcome semantics
///
/// - `handle` returns per-event outcomes.
/// - `handle_batch` is all-or-nothing for the slice it receives; the
///   dispatcher records the same outcome for every event in the slice.
/// - An event's final outcome is success iff *every* handler registered for
///   its type succeeded.
pub trait EventHandler: Send + Sync {
    /// Handler name, used in logs and dedup keys.
    fn name(&self) -> &'static str;

    /// The event types this handler consumes.
    fn event_types(&self) -> &'static [&'static str];

    /// Whether this handler wants the whole per-type slice at once.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Dispatch order among handlers of the same event type; lower runs
    /// first. The order handler runs at priority 1 so order-state
    /// transitions precede side-effect handlers.
    fn priority(&self) -> i32 {
        100
    }

    /// Handle a single event.
    fn handle<'a>(&'a self, event: &'a OutboxEvent) -> HandlerFuture<'a>;

    /// Handle a per-type slice of events.
    ///
    /// The default delegates to [`EventHandler::handle`] per event, failing
    /// fast on the first error — with batch size 1 this is exactly one
    /// `handle` call, so nothing is double-counted.
    fn handle_batch<'a>(&'a self, events: &'a [OutboxEvent]) -> HandlerFuture<'a> {
        Box::pin(async move {
            for event in events {
                self.handle(event).await?;
            }
            Ok(())
        })
    }
}
