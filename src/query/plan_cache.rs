//! Bounded LRU cache of prepared plans keyed by query text.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::RwLock;
use tracing::trace;

use crate::config::ExecOptions;
use crate::error::Result;

/// Shared LRU cache.
///
/// Lookups peek under the shared lock, so concurrent readers never block
/// each other; recency is bumped and entries are inserted or evicted under
/// the exclusive lock. Values are handed out as `Arc`s, so an entry evicted
/// while a caller still holds it stays alive until that caller drops it.
/// A capacity of zero disables caching.
pub struct PlanCache<V> {
    entries: Option<RwLock<LruCache<String, Arc<V>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Hit and miss counters of a [`PlanCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlanCacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to build.
    pub misses: u64,
}

impl<V> PlanCache<V> {
    /// Cache holding at most `capacity` plans.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| RwLock::new(LruCache::new(cap))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache sized by `options.plan_cache_capacity`.
    pub fn from_options(options: &ExecOptions) -> Self {
        Self::new(options.plan_cache_capacity)
    }

    /// Cached value for `key`, marking it most recently used.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let found = self
            .entries
            .as_ref()
            .and_then(|entries| entries.read().peek(key).cloned());
        match &found {
            Some(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                if let Some(entries) = &self.entries {
                    entries.write().promote(key);
                }
                trace!(key, "plan cache hit");
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(key, "plan cache miss");
            }
        }
        found
    }

    /// Stores `value` under `key`, evicting the least recently used entry
    /// when full.
    pub fn insert(&self, key: &str, value: V) -> Arc<V> {
        let value = Arc::new(value);
        if let Some(entries) = &self.entries {
            entries.write().put(key.to_string(), Arc::clone(&value));
        }
        value
    }

    /// Cached value for `key`, building and storing it on a miss. A failed
    /// build stores nothing.
    pub fn get_or_try_insert(&self, key: &str, build: impl FnOnce() -> Result<V>) -> Result<Arc<V>> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        Ok(self.insert(key, build()?))
    }

    /// Drops `key`.
    pub fn remove(&self, key: &str) -> Option<Arc<V>> {
        self.entries.as_ref().and_then(|entries| entries.write().pop(key))
    }

    /// Drops every entry; counters are kept.
    pub fn clear(&self) {
        if let Some(entries) = &self.entries {
            entries.write().clear();
        }
    }

    /// Number of cached plans.
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.read().len())
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached plans.
    pub fn capacity(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.read().cap().get())
    }

    /// Hit and miss counters.
    pub fn stats(&self) -> PlanCacheStats {
        PlanCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
