//! Auto-connect orchestrator.
//!
//! Walks the [`PageRegistry`] and subscribes one debounced
//! [`PageFilterListener`] per eligible page to `filter-changed`. Running it
//! again only picks up pages that were not connected yet, so the number of
//! bus handlers never grows from repeated calls.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ouvidoria_core::Renderer;
use ouvidoria_events::{names, DashboardEvent, EventBus, Unsubscribe};
use serde::Serialize;
use tracing::{debug, info};

use crate::listener::PageFilterListener;
use crate::registry::PageRegistry;

/// Why a registered page was left unconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingContainer,
    MissingReload,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingContainer => write!(f, "container not present"),
            Self::MissingReload => write!(f, "no reload function"),
        }
    }
}

/// Result of one [`AutoConnector::auto_connect_all_pages`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectReport {
    /// Pages connected by this pass.
    pub connected: Vec<String>,
    /// Pages that were connected by an earlier pass.
    pub already_connected: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
}

struct PageBinding {
    listener: PageFilterListener,
    subscription: Unsubscribe<DashboardEvent>,
}

pub struct AutoConnector {
    bus: Arc<EventBus<DashboardEvent>>,
    registry: Arc<PageRegistry>,
    renderer: Arc<dyn Renderer>,
    default_debounce: Duration,
    bindings: Mutex<BTreeMap<String, PageBinding>>,
}

impl AutoConnector {
    pub fn new(
        bus: Arc<EventBus<DashboardEvent>>,
        registry: Arc<PageRegistry>,
        renderer: Arc<dyn Renderer>,
        default_debounce: Duration,
    ) -> Self {
        Self {
            bus,
            registry,
            renderer,
            default_debounce,
            bindings: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, PageBinding>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connect every registered page that has a present container and a
    /// reload function and is not connected yet.
    pub fn auto_connect_all_pages(&self) -> ConnectReport {
        let mut report = ConnectReport::default();
        // Held for the whole pass so concurrent passes cannot both connect a page.
        let mut bindings = self.lock();

        for page in self.registry.pages() {
            if bindings.contains_key(&page.page_id) {
                report.already_connected.push(page.page_id);
                continue;
            }
            if !self.renderer.has_container(&page.container_id) {
                debug!(page_id = %page.page_id, container = %page.container_id, "page skipped: container not present");
                report.skipped.push((page.page_id, SkipReason::MissingContainer));
                continue;
            }
            let Some(reload) = page.reload else {
                debug!(page_id = %page.page_id, "page skipped: no reload function");
                report.skipped.push((page.page_id, SkipReason::MissingReload));
                continue;
            };

            let debounce = page.debounce.unwrap_or(self.default_debounce);
            let listener =
                PageFilterListener::new(page.page_id.clone(), reload, debounce, page.invalidation);
            let subscription = self
                .bus
                .on_handler(names::FILTER_CHANGED, listener.handler());
            debug!(page_id = %page.page_id, debounce_ms = debounce.as_millis() as u64, "page connected");
            bindings.insert(
                page.page_id.clone(),
                PageBinding {
                    listener,
                    subscription,
                },
            );
            report.connected.push(page.page_id);
        }

        info!(
            connected = report.connected.len(),
            already_connected = report.already_connected.len(),
            skipped = report.skipped.len(),
            "auto-connect pass finished"
        );
        report
    }

    /// Unsubscribe one page and drop its scheduled reload.
    pub fn disconnect_page(&self, page_id: &str) -> bool {
        let Some(binding) = self.lock().remove(page_id) else {
            return false;
        };
        binding.listener.cancel();
        binding.subscription.unsubscribe();
        debug!(page_id = page_id, "page disconnected");
        true
    }

    /// Disconnect every page. Returns how many were connected.
    pub fn disconnect_all(&self) -> usize {
        let bindings = std::mem::take(&mut *self.lock());
        for binding in bindings.values() {
            binding.listener.cancel();
            binding.subscription.unsubscribe();
        }
        bindings.len()
    }

    pub fn is_connected(&self, page_id: &str) -> bool {
        self.lock().contains_key(page_id)
    }

    /// Connected page ids, sorted.
    pub fn connected_pages(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// The listener bound to `page_id`, if connected.
    pub fn listener(&self, page_id: &str) -> Option<PageFilterListener> {
        self.lock().get(page_id).map(|b| b.listener.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::reload_fn;
    use crate::registry::PageRegistration;
    use ouvidoria_core::FilterSnapshot;
    use ouvidoria_test_utils::RecordingRenderer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop_reload() -> crate::listener::ReloadFn {
        reload_fn(|| async { Ok(()) })
    }

    fn setup(containers: &[&str]) -> (Arc<EventBus<DashboardEvent>>, Arc<PageRegistry>, AutoConnector) {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(PageRegistry::new());
        let renderer = Arc::new(RecordingRenderer::with_containers(containers.iter().copied()));
        let connector = AutoConnector::new(
            Arc::clone(&bus),
            Arc::clone(&registry),
            renderer,
            Duration::from_millis(500),
        );
        (bus, registry, connector)
    }

    #[test]
    fn test_repeated_passes_do_not_duplicate_handlers() {
        let (bus, registry, connector) = setup(&["chartCanal", "chartTipo"]);
        registry.register(PageRegistration::new("canal", "chartCanal").with_reload(noop_reload()));
        registry.register(PageRegistration::new("tipo", "chartTipo").with_reload(noop_reload()));

        let first = connector.auto_connect_all_pages();
        assert_eq!(first.connected, vec!["canal", "tipo"]);
        assert_eq!(bus.listener_count(names::FILTER_CHANGED), 2);

        let second = connector.auto_connect_all_pages();
        assert!(second.connected.is_empty());
        assert_eq!(second.already_connected, vec!["canal", "tipo"]);
        assert_eq!(bus.listener_count(names::FILTER_CHANGED), 2);
    }

    #[test]
    fn test_ineligible_pages_are_skipped() {
        let (bus, registry, connector) = setup(&["chartCanal", "chartTipo"]);
        registry.register(PageRegistration::new("canal", "chartCanal").with_reload(noop_reload()));
        registry.register(PageRegistration::new("tipo", "chartTipo"));
        registry.register(PageRegistration::new("bairro", "chartBairro").with_reload(noop_reload()));

        let report = connector.auto_connect_all_pages();
        assert_eq!(report.connected, vec!["canal"]);
        assert_eq!(
            report.skipped,
            vec![
                ("tipo".to_string(), SkipReason::MissingReload),
                ("bairro".to_string(), SkipReason::MissingContainer),
            ]
        );
        assert_eq!(bus.listener_count(names::FILTER_CHANGED), 1);

        // A page that gains a reload function is picked up by the next pass.
        registry.set_reload("tipo", noop_reload());
        let report = connector.auto_connect_all_pages();
        assert_eq!(report.connected, vec!["tipo"]);
        assert_eq!(bus.listener_count(names::FILTER_CHANGED), 2);
    }

    #[test]
    fn test_disconnect_and_reconnect() {
        let (bus, registry, connector) = setup(&["chartCanal"]);
        registry.register(PageRegistration::new("canal", "chartCanal").with_reload(noop_reload()));
        connector.auto_connect_all_pages();

        assert!(connector.disconnect_page("canal"));
        assert!(!connector.disconnect_page("canal"));
        assert_eq!(bus.listener_count(names::FILTER_CHANGED), 0);

        assert_eq!(connector.auto_connect_all_pages().connected, vec!["canal"]);
        assert_eq!(connector.disconnect_all(), 1);
        assert!(connector.connected_pages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_page_reloads_on_filter_change() {
        let (bus, registry, connector) = setup(&["chartCanal"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        registry.register(
            PageRegistration::new("canal", "chartCanal")
                .with_debounce(Duration::from_millis(100))
                .with_reload(reload_fn(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })),
        );
        connector.auto_connect_all_pages();
        assert_eq!(
            connector.listener("canal").map(|l| l.debounce()),
            Some(Duration::from_millis(100))
        );

        bus.publish(&DashboardEvent::filters_changed(FilterSnapshot::empty()));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
