//! An in-memory cache backend using `dashmap`.

use super::*;
use crate::metrics::Metrics;
use dashmap::DashMap;
use std::time::Instant;

/// An entry in the in-memory cache.
#[derive(Debug)]
struct CacheEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |expires_at| now >= expires_at)
    }
}

/// Where an entry lives. Grouped entries carry the group generation they
/// were written under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    group: Option<(String, u64)>,
    key: String,
}

/// Configuration options for the memory backend.
#[derive(Debug, Clone)]
pub struct MemoryBackendConfig {
    /// TTL applied when a caller stores without one (`None` = never expire).
    pub default_ttl: Option<Duration>,
    /// Sweep all expired entries on every write instead of only on access.
    pub sweep_on_write: bool,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            default_ttl: None,
            sweep_on_write: true,
        }
    }
}

/// An in-memory cache backend using `dashmap`.
///
/// Groups are namespaces with a generation counter: entries are stored under
/// `(group, generation, key)` and invalidating a group bumps its generation,
/// which orphans every entry written under the old one.
#[derive(Debug)]
pub struct MemoryBackend {
    store: DashMap<SlotKey, CacheEntry>,
    generations: DashMap<String, u64>,
    metrics: Metrics,
    config: MemoryBackendConfig,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Creates a new `MemoryBackend` with default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryBackendConfig::default())
    }

    /// Creates a new `MemoryBackend` with the given configuration.
    pub fn with_config(config: MemoryBackendConfig) -> Self {
        Self {
            store: DashMap::new(),
            generations: DashMap::new(),
            metrics: Metrics::default(),
            config,
        }
    }

    /// Sets the TTL used when a caller stores without one.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl = Some(ttl);
        self
    }

    /// Returns a reference to the metrics instance
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Number of live and not yet swept entries.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Current generation of `group`.
    pub fn group_generation(&self, group: &str) -> u64 {
        self.generations.get(group).map_or(0, |generation| *generation)
    }

    fn slot(&self, key: &str, group: Option<&str>) -> SlotKey {
        SlotKey {
            group: group.map(|group| (group.to_string(), self.group_generation(group))),
            key: key.to_string(),
        }
    }

    /// Removes expired entries from the cache.
    fn cleanup_expired(&self) {
        let now = Instant::now();
        self.store.retain(|_, entry| {
            if entry.is_expired(now) {
                self.metrics.record_eviction();
                return false;
            }
            true
        });
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str, group: Option<&str>) -> crate::Result<Option<Value>> {
        let slot = self.slot(key, group);
        let now = Instant::now();

        let expired = match self.store.get(&slot) {
            Some(entry) if !entry.is_expired(now) => {
                self.metrics.record_hit();
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.store
                .remove_if(&slot, |_, entry| entry.is_expired(now));
            self.metrics.record_eviction();
        }
        self.metrics.record_miss();
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        group: Option<&str>,
    ) -> crate::Result<()> {
        if self.config.sweep_on_write {
            self.cleanup_expired();
        }

        let ttl = ttl.or(self.config.default_ttl);
        let entry = CacheEntry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };

        self.store.insert(self.slot(key, group), entry);
        self.metrics.record_insertion();
        Ok(())
    }

    async fn remove(&self, key: &str, group: Option<&str>) -> crate::Result<()> {
        self.store.remove(&self.slot(key, group));
        Ok(())
    }

    async fn invalidate_group(&self, group: &str) -> crate::Result<()> {
        *self.generations.entry(group.to_string()).or_insert(0) += 1;

        self.store.retain(|slot, _| {
            let stale = matches!(&slot.group, Some((name, _)) if name == group);
            if stale {
                self.metrics.record_eviction();
                return false;
            }
            true
        });
        Ok(())
    }

    async fn clear(&self) -> crate::Result<()> {
        self.store.clear();
        Ok(())
    }
}
