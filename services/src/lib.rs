//! # Storefront Services
//!
//! Domain services of the Storefront backend. Each aggregate is owned by
//! exactly one service; services enforce per-aggregate invariants and
//! publish domain events through the transactional outbox (every mutating
//! repository call carries the events to co-write).
//!
//! The crate also hosts the cross-aggregate machinery built on top of the
//! services:
//!
//! - [`payment::PaymentSaga`] — balance-lock → gateway → debit → confirm,
//!   with compensation on failure;
//! - [`coupon::CouponIssueService`] — fast-path admission in the memory
//!   store, async drain into durable rows;
//! - [`stats::StatisticsService`] — hot counters folded into durable
//!   statistics and the popularity ranking;
//! - [`notifier::NotifierRegistry`] — per-user realtime subscriptions;
//! - [`handlers`] — the outbox event handlers wiring it all together;
//! - [`api::CommerceApi`] — the dyn facade the HTTP layer consumes.

pub mod api;
pub mod coupon;
pub mod handlers;
pub mod inventory;
pub mod locks;
pub mod notifier;
pub mod order;
pub mod payment;
pub mod point;
pub mod fulfillment;
pub mod stats;

pub use api::{CommerceApi, Services};
