//! # Storefront Runtime
//!
//! The delivery machinery of the Storefront backend: the outbox dispatcher,
//! the handler registry, the DLQ monitor, retry helpers and the periodic
//! worker harness.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   claim ≤ 50 by id   ┌──────────────────┐
//! │   outbox   │ ───────────────────► │ OutboxDispatcher │
//! └────────────┘                      └───────┬──────────┘
//!       ▲                                     │ group by event type
//!       │ mark / fail / DLQ                   ▼
//!       │                            ┌─────────────────┐
//!       └─────────────────────────── │ HandlerRegistry │
//!                                    └─────────────────┘
//!                                       ordered handlers
//! ```
//!
//! Delivery is at-least-once: the dispatcher retries failed events up to
//! `MAX_RETRY` and then moves them to the dead-letter queue, which the
//! [`dlq_monitor::DlqMonitor`] watches. Handlers must be idempotent.

pub mod dispatcher;
pub mod dlq_monitor;
pub mod registry;
pub mod retry;
pub mod scheduler;

pub use dispatcher::{CycleStats, OutboxDispatcher};
pub use dlq_monitor::{AlertChannel, DlqMonitor, LogAlertChannel};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder};
pub use retry::{RetryPolicy, retry_with_backoff, retry_with_predicate};
pub use scheduler::spawn_periodic;
