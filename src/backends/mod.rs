//! Backend adapters for the stores memoized values live in.
//!
//! A backend only needs get/set/delete with a per-key TTL. Every operation
//! also receives the wrapper's optional group so the backend can namespace
//! entries and drop a whole group at once.

use async_trait::async_trait;
use std::sync::Arc;
use std::{fmt::Debug, time::Duration};

#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;

/// A value in the cache.
pub type Value = Vec<u8>;

/// Trait defining the interface for all cache backends.
///
/// `get` must return `None` only when the key is absent. A stored empty
/// value is still `Some`.
#[async_trait]
pub trait CacheBackend: Send + Sync + Debug {
    /// Gets a value from the cache by key.
    async fn get(&self, key: &str, group: Option<&str>) -> crate::Result<Option<Value>>;

    /// Sets a value in the cache with an optional TTL.
    async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        group: Option<&str>,
    ) -> crate::Result<()>;

    /// Removes a value from the cache by key. Removing an absent key is not an error.
    async fn remove(&self, key: &str, group: Option<&str>) -> crate::Result<()>;

    /// Drops every entry stored under `group`.
    async fn invalidate_group(&self, group: &str) -> crate::Result<()> {
        Err(crate::error::Error::NotImplemented(format!(
            "group invalidation for `{}`",
            group
        )))
    }

    /// Clears all values from the cache.
    async fn clear(&self) -> crate::Result<()>;
}

/// A shared cache backend handle.
pub type Backend = Arc<dyn CacheBackend>;
