//! Application context.
//!
//! Owns the process-wide services: one event bus, one cache store, one
//! loader, one filter state. Everything else borrows them from here.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use ouvidoria_cache::{AggregateSource, CacheStore, DataLoader, Payload};
use ouvidoria_core::Renderer;
use ouvidoria_events::{DashboardEvent, EventBus, ReloadOutcome};
use tracing::info;

use crate::config::DashboardConfig;
use crate::connect::{AutoConnector, ConnectReport};
use crate::filters::FilterState;
use crate::pages::{DashboardPage, PageServices, StatusBoard};
use crate::registry::PageRegistry;

pub struct AppContext {
    config: DashboardConfig,
    bus: Arc<EventBus<DashboardEvent>>,
    cache: Arc<CacheStore<Payload>>,
    loader: DataLoader,
    filters: Arc<FilterState>,
    registry: Arc<PageRegistry>,
    renderer: Arc<dyn Renderer>,
    status: Arc<StatusBoard>,
    connector: AutoConnector,
    pages: Mutex<Vec<Arc<DashboardPage>>>,
}

impl AppContext {
    pub fn new(
        config: DashboardConfig,
        source: Arc<dyn AggregateSource>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let cache = Arc::new(CacheStore::new());
        let loader = DataLoader::new(source, Arc::clone(&cache));
        let filters = Arc::new(FilterState::new(Arc::clone(&bus)));
        let registry = Arc::new(PageRegistry::new());
        let connector = AutoConnector::new(
            Arc::clone(&bus),
            Arc::clone(&registry),
            Arc::clone(&renderer),
            config.debounce(),
        );
        Self {
            config,
            bus,
            cache,
            loader,
            filters,
            registry,
            renderer,
            status: Arc::new(StatusBoard::new()),
            connector,
            pages: Mutex::new(Vec::new()),
        }
    }

    fn lock_pages(&self) -> MutexGuard<'_, Vec<Arc<DashboardPage>>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus<DashboardEvent>> {
        &self.bus
    }

    pub fn cache(&self) -> &Arc<CacheStore<Payload>> {
        &self.cache
    }

    pub fn loader(&self) -> &DataLoader {
        &self.loader
    }

    pub fn filters(&self) -> &Arc<FilterState> {
        &self.filters
    }

    pub fn registry(&self) -> &Arc<PageRegistry> {
        &self.registry
    }

    pub fn status(&self) -> &Arc<StatusBoard> {
        &self.status
    }

    pub fn connector(&self) -> &AutoConnector {
        &self.connector
    }

    fn services(&self) -> PageServices {
        PageServices {
            loader: self.loader.clone(),
            filters: Arc::clone(&self.filters),
            renderer: Arc::clone(&self.renderer),
            bus: Arc::clone(&self.bus),
            status: Arc::clone(&self.status),
        }
    }

    /// Build a page for every configured entry and register it. A second
    /// call keeps the pages already installed.
    pub fn install_pages(&self) -> usize {
        let mut installed = self.lock_pages();
        if !installed.is_empty() {
            return installed.len();
        }
        let services = self.services();
        let pages: Vec<Arc<DashboardPage>> = self
            .config
            .pages
            .iter()
            .map(|page| {
                Arc::new(DashboardPage::new(
                    page.clone(),
                    self.config.page_ttl(page),
                    self.config.page_debounce(page),
                    services.clone(),
                ))
            })
            .collect();
        for page in &pages {
            self.registry.register(page.registration());
        }
        let count = pages.len();
        *installed = pages;
        count
    }

    /// Register configured pages and wire them to filter changes.
    pub fn start(&self) -> ConnectReport {
        let installed = self.install_pages();
        let report = self.connector.auto_connect_all_pages();
        info!(
            pages = installed,
            connected = report.connected.len(),
            skipped = report.skipped.len(),
            "dashboard started"
        );
        report
    }

    pub fn pages(&self) -> Vec<Arc<DashboardPage>> {
        self.lock_pages().clone()
    }

    /// Reload every page concurrently. `force` skips cache reads.
    pub async fn reload_all(&self, force: bool) -> Vec<(String, ReloadOutcome)> {
        let pages = self.pages();
        let outcomes = join_all(pages.iter().map(|page| page.reload(force))).await;
        pages
            .iter()
            .map(|page| page.id().to_string())
            .zip(outcomes)
            .collect()
    }

    /// Drop all cached aggregates and reload from the source.
    pub async fn refresh(&self) -> Vec<(String, ReloadOutcome)> {
        let removed = self.loader.invalidate_all();
        info!(removed = removed, "cache cleared for refresh");
        self.bus.publish(&DashboardEvent::DataInvalidated {
            resources: vec!["/".to_string()],
            removed,
        });
        self.reload_all(false).await
    }

    /// Disconnect pages and drop every bus handler.
    pub fn shutdown(&self) {
        let disconnected = self.connector.disconnect_all();
        self.bus.clear();
        info!(disconnected = disconnected, "dashboard stopped");
    }
}
