//! Page registry.
//!
//! Pages announce themselves here with the container they draw into and the
//! reload function that refreshes them. The orchestrator in
//! [`connect`](crate::connect) reads the registry; pages never subscribe to
//! the bus on their own.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::listener::{CacheInvalidation, ReloadFn};

/// What the orchestrator needs to wire one page.
#[derive(Clone)]
pub struct PageRegistration {
    pub page_id: String,
    pub container_id: String,
    /// `None` while the page has no way to refresh itself; such pages are
    /// not connected.
    pub reload: Option<ReloadFn>,
    /// Debounce override. The orchestrator default applies when `None`.
    pub debounce: Option<Duration>,
    pub invalidation: Option<CacheInvalidation>,
}

impl PageRegistration {
    pub fn new(page_id: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self {
            page_id: page_id.into(),
            container_id: container_id.into(),
            reload: None,
            debounce: None,
            invalidation: None,
        }
    }

    pub fn with_reload(mut self, reload: ReloadFn) -> Self {
        self.reload = Some(reload);
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = Some(debounce);
        self
    }

    pub fn with_invalidation(mut self, invalidation: CacheInvalidation) -> Self {
        self.invalidation = Some(invalidation);
        self
    }
}

impl std::fmt::Debug for PageRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageRegistration")
            .field("page_id", &self.page_id)
            .field("container_id", &self.container_id)
            .field("has_reload", &self.reload.is_some())
            .field("debounce", &self.debounce)
            .finish()
    }
}

/// Registered pages in registration order, unique by page id.
#[derive(Default)]
pub struct PageRegistry {
    pages: Mutex<Vec<PageRegistration>>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PageRegistration>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a page, or replace the registration with the same id in place.
    pub fn register(&self, registration: PageRegistration) {
        let mut pages = self.lock();
        match pages.iter_mut().find(|p| p.page_id == registration.page_id) {
            Some(existing) => *existing = registration,
            None => pages.push(registration),
        }
    }

    /// Attach or replace the reload function of an already registered page.
    /// Returns `false` when the page is unknown.
    pub fn set_reload(&self, page_id: &str, reload: ReloadFn) -> bool {
        match self.lock().iter_mut().find(|p| p.page_id == page_id) {
            Some(page) => {
                page.reload = Some(reload);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, page_id: &str) -> Option<PageRegistration> {
        self.lock().iter().find(|p| p.page_id == page_id).cloned()
    }

    /// Copy of every registration, in registration order.
    pub fn pages(&self) -> Vec<PageRegistration> {
        self.lock().clone()
    }

    pub fn page_ids(&self) -> Vec<String> {
        self.lock().iter().map(|p| p.page_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
