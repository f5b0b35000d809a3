//! Debounced page reload on filter change.
//!
//! A [`PageFilterListener`] turns a burst of `filter-changed` events into a
//! single call of the page's reload function, made once the filters have
//! been quiet for the debounce window. Each trigger restarts the window, so
//! the reload always reads the filter state as of the last change.
//!
//! ```text
//! trigger ─► Idle ──────────────► Pending{g1} ──(window elapses)──► reload
//! trigger ─► Pending{g1} ─abort─► Pending{g2}
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use ouvidoria_cache::DataLoader;
use ouvidoria_core::{ListenerError, ReloadError};
use ouvidoria_events::{DashboardEvent, EventBus, Handler};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

/// Quiet period used when a page does not configure its own.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// A page's reload function. Reads the current filters itself.
pub type ReloadFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), ReloadError>> + Send + Sync>;

/// Wrap an async closure as a [`ReloadFn`].
pub fn reload_fn<F, Fut>(reload: F) -> ReloadFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ReloadError>> + Send + 'static,
{
    Arc::new(move || reload().boxed())
}

/// Cache entries a page drops before reloading after a filter change.
#[derive(Clone)]
pub struct CacheInvalidation {
    loader: DataLoader,
    resources: Vec<String>,
    announce: Option<Weak<EventBus<DashboardEvent>>>,
}

impl CacheInvalidation {
    /// Drop entries under each endpoint path prefix in `resources`.
    pub fn new(loader: DataLoader, resources: Vec<String>) -> Self {
        Self {
            loader,
            resources,
            announce: None,
        }
    }

    /// Publish `data-invalidated` on `bus` after each invalidation.
    pub fn announce_on(mut self, bus: &Arc<EventBus<DashboardEvent>>) -> Self {
        self.announce = Some(Arc::downgrade(bus));
        self
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    fn apply(&self, page_id: &str) -> usize {
        let removed: usize = self
            .resources
            .iter()
            .map(|prefix| self.loader.invalidate_resource(prefix))
            .sum();
        debug!(page_id = page_id, removed = removed, "cache invalidated before reload");
        if let Some(bus) = self.announce.as_ref().and_then(Weak::upgrade) {
            bus.publish(&DashboardEvent::DataInvalidated {
                resources: self.resources.clone(),
                removed,
            });
        }
        removed
    }
}

enum DebounceState {
    Idle,
    Pending { generation: u64, task: AbortHandle },
}

struct ListenerState {
    generation: u64,
    debounce: DebounceState,
}

struct ListenerInner {
    page_id: String,
    reload: ReloadFn,
    debounce: Duration,
    invalidation: Option<CacheInvalidation>,
    state: Mutex<ListenerState>,
    reloads: AtomicU64,
}

impl ListenerInner {
    fn lock_state(&self) -> MutexGuard<'_, ListenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fire(self: Arc<Self>, generation: u64) {
        {
            let mut state = self.lock_state();
            match &state.debounce {
                DebounceState::Pending { generation: pending, .. } if *pending == generation => {}
                _ => return,
            }
            state.debounce = DebounceState::Idle;
        }

        if let Some(invalidation) = &self.invalidation {
            invalidation.apply(&self.page_id);
        }

        let count = self.reloads.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(page_id = %self.page_id, reload = count, "reloading page after filter change");
        if let Err(err) = (self.reload)().await {
            warn!(page_id = %self.page_id, error = %err, "page reload failed");
        }
    }
}

/// Debounced filter-change handler bound to one page.
#[derive(Clone)]
pub struct PageFilterListener {
    inner: Arc<ListenerInner>,
}

/// Build a listener that calls `reload` once filters have been quiet for
/// `debounce`.
pub fn create_page_filter_listener(
    page_id: impl Into<String>,
    reload: ReloadFn,
    debounce: Duration,
) -> PageFilterListener {
    PageFilterListener::new(page_id, reload, debounce, None)
}

impl PageFilterListener {
    pub fn new(
        page_id: impl Into<String>,
        reload: ReloadFn,
        debounce: Duration,
        invalidation: Option<CacheInvalidation>,
    ) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                page_id: page_id.into(),
                reload,
                debounce,
                invalidation,
                state: Mutex::new(ListenerState {
                    generation: 0,
                    debounce: DebounceState::Idle,
                }),
                reloads: AtomicU64::new(0),
            }),
        }
    }

    pub fn page_id(&self) -> &str {
        &self.inner.page_id
    }

    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    /// Reloads started so far.
    pub fn reload_count(&self) -> u64 {
        self.inner.reloads.load(Ordering::SeqCst)
    }

    /// Whether a reload is scheduled and its window has not elapsed yet.
    pub fn is_pending(&self) -> bool {
        matches!(self.inner.lock_state().debounce, DebounceState::Pending { .. })
    }

    /// Restart the debounce window. Needs a Tokio runtime on the calling
    /// thread.
    pub fn trigger(&self) -> Result<(), ListenerError> {
        let runtime = Handle::try_current().map_err(|_| ListenerError::NoRuntime)?;

        // Held across the spawn so the task cannot observe a stale state.
        let mut state = self.inner.lock_state();
        state.generation += 1;
        let generation = state.generation;
        if let DebounceState::Pending { task, .. } =
            std::mem::replace(&mut state.debounce, DebounceState::Idle)
        {
            task.abort();
            trace!(page_id = %self.inner.page_id, "pending reload superseded");
        }

        let inner = Arc::clone(&self.inner);
        let task = runtime.spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            inner.fire(generation).await;
        });
        state.debounce = DebounceState::Pending {
            generation,
            task: task.abort_handle(),
        };
        Ok(())
    }

    /// Drop a scheduled reload, if any. A reload already running finishes.
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.lock_state();
        match std::mem::replace(&mut state.debounce, DebounceState::Idle) {
            DebounceState::Pending { task, .. } => {
                task.abort();
                true
            }
            DebounceState::Idle => false,
        }
    }

    /// Bus handler that restarts the window on every event it receives.
    pub fn handler(&self) -> Handler<DashboardEvent> {
        let listener = self.clone();
        Arc::new(move |event: &DashboardEvent| {
            if let Some(filters) = event.filters() {
                trace!(page_id = %listener.page_id(), filters = %filters, "filter change received");
            }
            listener.trigger()
        })
    }
}

impl std::fmt::Debug for PageFilterListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFilterListener")
            .field("page_id", &self.inner.page_id)
            .field("debounce", &self.inner.debounce)
            .field("pending", &self.is_pending())
            .field("reloads", &self.reload_count())
            .finish()
    }
}
