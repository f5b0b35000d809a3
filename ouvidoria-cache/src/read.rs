//! Read results carrying cache metadata.

use std::time::Duration;
use tokio::time::Instant;

/// Result of a load, carrying whether it came from the cache and how old it is.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    stored_at: Instant,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// A value served from a valid cache entry.
    pub fn from_cache(value: T, stored_at: Instant) -> Self {
        Self {
            value,
            stored_at,
            was_cache_hit: true,
        }
    }

    /// A value that was just fetched from the source.
    pub fn from_source(value: T) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            was_cache_hit: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Time since the value was stored (zero for a fresh fetch).
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.stored_at)
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            stored_at: self.stored_at,
            was_cache_hit: self.was_cache_hit,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
