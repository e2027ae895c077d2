//! # Storefront Redis
//!
//! Redis implementations of the memory-store seams: coupon admission
//! primitives, statistics buffers, the JSON cache, the distributed lock
//! manager and the cross-instance notification bus.
//!
//! All keys live under the frozen `ecom:*` taxonomy
//! ([`storefront_core::keys`]); each component stays inside its own
//! prefix. Connections go through a shared
//! [`redis::aio::ConnectionManager`] (connection pooling with automatic
//! reconnection).

mod kv;
mod lock;
mod notify;

pub use kv::RedisKv;
pub use lock::RedisLockManager;
pub use notify::RedisNotificationBus;

use storefront_core::error::CommerceError;

/// Map a redis error onto the memory-store error kind.
pub(crate) fn mem_err(e: &redis::RedisError) -> CommerceError {
    CommerceError::MemoryStore(e.to_string())
}
