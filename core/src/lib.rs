//! # Storefront Core
//!
//! Domain model and trait seams for the Storefront e-commerce backend.
//!
//! This crate defines the vocabulary of the system and the boundaries the
//! other crates plug into:
//!
//! - **Domain aggregates**: orders, payments, point balances, coupons,
//!   inventory, deliveries, carts and product statistics, each with its
//!   invariants encoded at construction time.
//! - **Domain events**: a tagged enum of JSON payloads with stable field
//!   names, carried through the transactional outbox.
//! - **Error taxonomy**: a single [`error::CommerceError`] enum with stable
//!   machine codes and machine-readable data maps.
//! - **Trait seams**: repositories over the durable store, memory-store
//!   primitives, the distributed lock manager, the payment gateway and the
//!   event handler contract. Production implementations live in the
//!   `storefront-postgres` and `storefront-redis` crates; deterministic
//!   in-memory implementations live in `storefront-testing`.
//!
//! # Design principles
//!
//! - Every mutating repository operation accepts the outbox events to
//!   co-write, so "event appended in the same transaction as the aggregate
//!   change" is part of the contract rather than a convention.
//! - Repository traits return `impl Future + Send` so generic callers can be
//!   boxed into dyn-compatible handlers without extra bounds.
//! - No `unwrap`/`expect` outside tests; fallible paths return
//!   [`error::Result`].

pub mod cart;
pub mod clock;
pub mod coupon;
pub mod delivery;
pub mod error;
pub mod event;
pub mod gateway;
pub mod handler;
pub mod ids;
pub mod inventory;
pub mod keys;
pub mod lock;
pub mod memstore;
pub mod notify;
pub mod order;
pub mod outbox;
pub mod payment;
pub mod point;
pub mod stats;
pub mod store;

pub use error::{CommerceError, Result};
pub use ids::{CouponId, OrderId, ProductId, UserId};

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
