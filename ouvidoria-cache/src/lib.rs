//! Cache layer for aggregate query results.
//!
//! [`CacheStore`] keeps values keyed by [`RequestKey`](ouvidoria_core::RequestKey)
//! with a per-entry time-to-live. Expiry is checked lazily on read, so there is
//! no background sweeper and no timer per key; an expired entry is never
//! returned even while it still occupies memory.
//!
//! [`DataLoader`] fronts the store. It serves cache hits without touching the
//! network and guarantees at most one outstanding fetch per request key:
//! concurrent callers for the same key share a single pending result.
//!
//! # Example
//!
//! ```ignore
//! let loader = DataLoader::new(source, Arc::new(CacheStore::new()));
//! let rows = loader
//!     .load("/api/aggregate/count-by?field=Tipo", &LoadOptions::cached(Duration::from_secs(600)))
//!     .await?;
//! ```

pub mod loader;
pub mod read;
pub mod stats;
pub mod store;

pub use loader::{AggregateSource, DataLoader, LoadOptions, Payload, DEFAULT_TTL};
pub use read::CacheRead;
pub use stats::CacheStats;
pub use store::CacheStore;
