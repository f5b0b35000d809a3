//! TTL cache store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ouvidoria_core::RequestKey;
use tokio::time::Instant;
use tracing::trace;

use crate::read::CacheRead;
use crate::stats::CacheStats;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_valid(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

#[derive(Debug)]
struct StoreInner<V> {
    entries: HashMap<RequestKey, CacheEntry<V>>,
    stats: CacheStats,
}

/// Cached values keyed by request signature, each with its own TTL.
///
/// An entry is valid iff `now - stored_at < ttl`. Expired entries are
/// logically absent: `get` drops them and reports a miss.
#[derive(Debug)]
pub struct CacheStore<V> {
    inner: Mutex<StoreInner<V>>,
}

impl<V: Clone> Default for CacheStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> CacheStore<V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached value for `key`, if present and not expired.
    pub fn get(&self, key: &RequestKey) -> Option<V> {
        self.get_read(key).map(CacheRead::into_value)
    }

    /// Like [`get`](Self::get), with the entry's age attached.
    pub fn get_read(&self, key: &RequestKey) -> Option<CacheRead<V>> {
        let now = Instant::now();
        let mut guard = self.lock();
        let inner = &mut *guard;
        let valid = inner.entries.get(key).map(|entry| entry.is_valid(now));
        match valid {
            Some(true) => {
                inner.stats.hits += 1;
                inner
                    .entries
                    .get(key)
                    .map(|entry| CacheRead::from_cache(entry.value.clone(), entry.stored_at))
            }
            Some(false) => {
                inner.entries.remove(key);
                inner.stats.expirations += 1;
                inner.stats.misses += 1;
                trace!(key = %key, "cache entry expired");
                None
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Valid entry for `key` without touching stats or evicting.
    pub fn peek(&self, key: &RequestKey) -> Option<CacheRead<V>> {
        let now = Instant::now();
        self.lock()
            .entries
            .get(key)
            .filter(|entry| entry.is_valid(now))
            .map(|entry| CacheRead::from_cache(entry.value.clone(), entry.stored_at))
    }

    /// Store or overwrite `key`. The entry's age restarts at zero.
    pub fn set(&self, key: RequestKey, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            stored_at: Instant::now(),
            ttl,
        };
        self.lock().entries.insert(key, entry);
    }

    /// Remove `key` regardless of TTL. Returns whether an entry was present.
    pub fn invalidate(&self, key: &RequestKey) -> bool {
        let mut inner = self.lock();
        let removed = inner.entries.remove(key).is_some();
        if removed {
            inner.stats.invalidations += 1;
        }
        removed
    }

    /// Remove every entry whose endpoint path starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.invalidate_where(|key| key.path().starts_with(prefix))
    }

    /// Remove every entry whose key matches `predicate`.
    pub fn invalidate_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&RequestKey) -> bool,
    {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !predicate(key));
        let removed = before - inner.entries.len();
        inner.stats.invalidations += removed as u64;
        removed
    }

    /// Remove every entry.
    pub fn invalidate_all(&self) -> usize {
        let mut inner = self.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.stats.invalidations += removed as u64;
        removed
    }

    /// Drop expired entries. Optional; reads never depend on it.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.is_valid(now));
        let removed = before - inner.entries.len();
        inner.stats.expirations += removed as u64;
        removed
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entry_count: inner.entries.len() as u64,
            ..inner.stats.clone()
        }
    }
}
