//! # Storefront Testing
//!
//! Deterministic in-memory implementations of every trait seam in
//! `storefront-core`, plus mocks and fixtures.
//!
//! The durable-store seams are implemented by [`mocks::MemoryStores`] over a
//! single mutex, which gives composite operations the same cross-aggregate
//! atomicity the Postgres transactions give. The memory-store seams are
//! implemented by [`mocks::MemoryKv`]. Both are cheap to clone (shared
//! state), so tests can hand them to services and keep a handle for
//! assertions.
//!
//! ## Example
//!
//! ```ignore
//! use storefront_testing::mocks::{MemoryStores, MemoryKv, MockGateway, test_clock};
//!
//! #[tokio::test]
//! async fn charge_then_deduct_roundtrips() {
//!     let stores = MemoryStores::new(test_clock());
//!     let service = PointService::new(stores.clone(), /* … */);
//!     service.charge(UserId::new(1), 10_000, "welcome").await?;
//! }
//! ```

pub mod fixtures;
pub mod mocks;

pub use mocks::{FixedClock, test_clock};
