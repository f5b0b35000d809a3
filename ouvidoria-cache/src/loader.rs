//! Data loader fronting the cache store.
//!
//! The loader turns a resource locator plus [`LoadOptions`] into a
//! [`RequestKey`], serves valid cache entries directly, and otherwise runs a
//! single fetch per key. Fetches run as spawned tasks: a caller that stops
//! waiting does not cancel the fetch, and its result still lands in the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use ouvidoria_core::{FetchError, RequestKey, ResourceRequest};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::read::CacheRead;
use crate::store::CacheStore;

/// Cached response body. Shared so repeated loads hand out the same allocation.
pub type Payload = Arc<JsonValue>;

/// Default time-to-live for cached aggregates (10 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// The aggregate API, consumed as an opaque JSON source.
#[async_trait]
pub trait AggregateSource: Send + Sync {
    /// Fetch one resource. `request` carries the decoded path and parameters.
    async fn fetch(&self, request: &ResourceRequest) -> Result<JsonValue, FetchError>;
}

/// Per-call loading policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Read from the cache before fetching. When `false` the cache read is
    /// skipped, but the fresh result is still written back so later cached
    /// reads see it.
    pub use_data_store: bool,
    /// Lifetime of the entry written after a successful fetch.
    pub ttl: Duration,
    /// Extra query parameters, merged with those in the locator.
    pub params: Vec<(String, String)>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::cached(DEFAULT_TTL)
    }
}

impl LoadOptions {
    /// Serve from cache when possible, caching fetched results for `ttl`.
    pub fn cached(ttl: Duration) -> Self {
        Self {
            use_data_store: true,
            ttl,
            params: Vec::new(),
        }
    }

    /// Always fetch, then refresh the cache with the result.
    pub fn bypass(ttl: Duration) -> Self {
        Self {
            use_data_store: false,
            ttl,
            params: Vec::new(),
        }
    }

    /// Append query parameters.
    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

type PendingFetch = Shared<BoxFuture<'static, Result<Payload, FetchError>>>;

enum Joined {
    Cached(CacheRead<Payload>),
    Pending(PendingFetch),
}

struct InFlight {
    id: u64,
    pending: PendingFetch,
}

#[derive(Default)]
struct InFlightTable {
    next_id: u64,
    fetches: HashMap<RequestKey, InFlight>,
}

type SharedTable = Arc<Mutex<InFlightTable>>;

fn lock_table(table: &Mutex<InFlightTable>) -> MutexGuard<'_, InFlightTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases an in-flight slot when its fetch task ends, however it ends.
struct InFlightGuard {
    table: SharedTable,
    key: RequestKey,
    id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut table = lock_table(&self.table);
        if table.fetches.get(&self.key).map(|f| f.id) == Some(self.id) {
            table.fetches.remove(&self.key);
        }
    }
}

/// Cache-aware, coalescing loader for aggregate resources.
#[derive(Clone)]
pub struct DataLoader {
    source: Arc<dyn AggregateSource>,
    cache: Arc<CacheStore<Payload>>,
    in_flight: SharedTable,
}

impl DataLoader {
    pub fn new(source: Arc<dyn AggregateSource>, cache: Arc<CacheStore<Payload>>) -> Self {
        Self {
            source,
            cache,
            in_flight: Arc::new(Mutex::new(InFlightTable::default())),
        }
    }

    /// The cache store this loader reads and populates.
    pub fn cache(&self) -> &Arc<CacheStore<Payload>> {
        &self.cache
    }

    /// Number of fetches currently outstanding.
    pub fn in_flight(&self) -> usize {
        lock_table(&self.in_flight).fetches.len()
    }

    /// Load a resource, from cache when allowed, otherwise through a single
    /// shared fetch.
    pub async fn load(&self, locator: &str, options: &LoadOptions) -> Result<Payload, FetchError> {
        self.load_read(locator, options)
            .await
            .map(CacheRead::into_value)
    }

    /// Like [`load`](Self::load), keeping hit/miss and age metadata.
    pub async fn load_read(
        &self,
        locator: &str,
        options: &LoadOptions,
    ) -> Result<CacheRead<Payload>, FetchError> {
        let request = request_for(locator, options);
        let key = request.key();

        if options.use_data_store {
            if let Some(read) = self.cache.get_read(&key) {
                debug!(key = %key, age_ms = read.age().as_millis() as u64, "cache hit");
                return Ok(read);
            }
        }

        let pending = match self.join_or_start(&key, request, options) {
            Joined::Cached(read) => return Ok(read),
            Joined::Pending(pending) => pending,
        };
        let payload = pending.await?;
        Ok(CacheRead::from_source(payload))
    }

    /// Load and decode into `T`. A body that does not decode is dropped from
    /// the cache so the next load fetches again.
    pub async fn load_as<T>(&self, locator: &str, options: &LoadOptions) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        let payload = self.load(locator, options).await?;
        T::deserialize(payload.as_ref()).map_err(|err| {
            let key = request_for(locator, options).key();
            self.cache.invalidate(&key);
            FetchError::decode(key.as_str(), err)
        })
    }

    /// Drop the entry a `load(locator, options)` call would read.
    pub fn invalidate(&self, locator: &str, options: &LoadOptions) -> bool {
        self.cache.invalidate(&request_for(locator, options).key())
    }

    /// Drop every cached entry under an endpoint path prefix.
    pub fn invalidate_resource(&self, path_prefix: &str) -> usize {
        self.cache.invalidate_prefix(path_prefix)
    }

    pub fn invalidate_all(&self) -> usize {
        self.cache.invalidate_all()
    }

    /// Join the outstanding fetch for `key`, or start one.
    fn join_or_start(
        &self,
        key: &RequestKey,
        request: ResourceRequest,
        options: &LoadOptions,
    ) -> Joined {
        let mut table = lock_table(&self.in_flight);

        if let Some(existing) = table.fetches.get(key) {
            debug!(key = %key, "joining in-flight fetch");
            return Joined::Pending(existing.pending.clone());
        }

        // A fetch may have finished between the cache check and taking the lock.
        if options.use_data_store {
            if let Some(read) = self.cache.peek(key) {
                return Joined::Cached(read);
            }
        }

        let id = table.next_id;
        table.next_id += 1;

        let guard = InFlightGuard {
            table: Arc::clone(&self.in_flight),
            key: key.clone(),
            id,
        };
        let task = tokio::spawn(fetch_and_store(
            Arc::clone(&self.source),
            Arc::clone(&self.cache),
            request,
            key.clone(),
            options.ttl,
            guard,
        ));

        let locator = key.to_string();
        let pending = async move {
            match task.await {
                Ok(result) => result,
                Err(err) => Err(FetchError::Interrupted {
                    locator,
                    reason: err.to_string(),
                }),
            }
        }
        .boxed()
        .shared();

        debug!(key = %key, "starting fetch");
        table.fetches.insert(
            key.clone(),
            InFlight {
                id,
                pending: pending.clone(),
            },
        );
        Joined::Pending(pending)
    }
}

fn request_for(locator: &str, options: &LoadOptions) -> ResourceRequest {
    ResourceRequest::parse(locator).with_params(options.params.iter().cloned())
}

async fn fetch_and_store(
    source: Arc<dyn AggregateSource>,
    cache: Arc<CacheStore<Payload>>,
    request: ResourceRequest,
    key: RequestKey,
    ttl: Duration,
    guard: InFlightGuard,
) -> Result<Payload, FetchError> {
    let result = source.fetch(&request).await;
    let outcome = match result {
        Ok(body) => {
            let payload = Arc::new(body);
            // Cached before the slot is released.
            cache.set(key, Arc::clone(&payload), ttl);
            Ok(payload)
        }
        Err(err) => {
            warn!(key = %key, error = %err, "fetch failed");
            Err(err)
        }
    };
    drop(guard);
    outcome
}
