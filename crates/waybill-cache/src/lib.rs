//! Waybill Cache - TTL key-value cache port.
//!
//! This crate provides the caching layer for the waybill platform. The
//! [`Cache`] trait is the port; adapters implement it for concrete backends:
//!
//! - [`RedisCache`] - production adapter over a shared Redis instance
//! - [`MemoryCache`] - in-process adapter used by tests and local runs
//!
//! Keys are namespaced by prefix (`order_`, `ts_`, `site_banner`). Values are
//! opaque byte payloads; serialization is the caller's concern. A missing key
//! is reported as [`CacheError::NotFound`], which callers must treat
//! differently from a transport failure: lookups fall through to the source
//! of truth on *any* error, but only a healthy round-trip counts as a hit.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use waybill_cache::{Cache, MemoryCache};
//!
//! # async fn demo() -> Result<(), waybill_cache::CacheError> {
//! let cache = MemoryCache::new();
//! cache.set("ts_acme_123", b"{}", Duration::from_secs(1800)).await?;
//! let payload = cache.get("ts_acme_123").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
mod memory;
mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;

pub use error::{CacheError, Result};
pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

/// Caching port for the waybill services.
///
/// Implementations must be cheap to clone (or wrapped in `Arc`) and safe to
/// share across concurrent requests.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Retrieves the value stored under `key`.
    ///
    /// Returns [`CacheError::NotFound`] when the key does not exist or has
    /// expired.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Stores `value` under `key` with the given TTL.
    ///
    /// A zero TTL means the entry never expires.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Removes the value stored under `key`. Deleting a missing key is not
    /// an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()>;
}
