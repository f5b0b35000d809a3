//! Shared crossfilter state.
//!
//! One [`FilterState`] per dashboard. Every mutation that changes the active
//! set publishes exactly one `filter-changed` event carrying the snapshot
//! taken right after the change. Mutations that change nothing publish
//! nothing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ouvidoria_core::{FilterPredicate, FilterSnapshot};
use ouvidoria_events::{DashboardEvent, EventBus};
use tracing::debug;

pub struct FilterState {
    active: Mutex<Vec<FilterPredicate>>,
    bus: Arc<EventBus<DashboardEvent>>,
}

impl FilterState {
    pub fn new(bus: Arc<EventBus<DashboardEvent>>) -> Self {
        Self {
            active: Mutex::new(Vec::new()),
            bus,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FilterPredicate>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current predicates. Later mutations do not affect the returned value.
    pub fn get_active(&self) -> FilterSnapshot {
        FilterSnapshot::from_predicates(self.lock().iter().cloned())
    }

    /// Value selected for `dimension`.
    pub fn value_of(&self, dimension: &str) -> Option<String> {
        self.lock()
            .iter()
            .find(|p| p.dimension == dimension)
            .map(|p| p.value.clone())
    }

    /// Select `value` for `dimension`, replacing any previous selection in
    /// place. Returns whether anything changed.
    pub fn set_filter(&self, dimension: &str, value: &str) -> bool {
        let snapshot = {
            let mut active = self.lock();
            match active.iter_mut().find(|p| p.dimension == dimension) {
                Some(existing) if existing.value == value => return false,
                Some(existing) => existing.value = value.to_string(),
                None => active.push(FilterPredicate::new(dimension, value)),
            }
            FilterSnapshot::from_predicates(active.iter().cloned())
        };
        self.notify(snapshot);
        true
    }

    /// Drop the selection on `dimension`. Returns whether one existed.
    pub fn clear_filter(&self, dimension: &str) -> bool {
        let snapshot = {
            let mut active = self.lock();
            let before = active.len();
            active.retain(|p| p.dimension != dimension);
            if active.len() == before {
                return false;
            }
            FilterSnapshot::from_predicates(active.iter().cloned())
        };
        self.notify(snapshot);
        true
    }

    /// Drop every selection. Returns how many were removed.
    pub fn clear_all(&self) -> usize {
        let removed = {
            let mut active = self.lock();
            std::mem::take(&mut *active).len()
        };
        if removed > 0 {
            self.notify(FilterSnapshot::empty());
        }
        removed
    }

    /// Chart-click semantics: clicking the selected bar clears the dimension,
    /// clicking any other bar selects it. Returns whether `value` is selected
    /// afterwards.
    pub fn toggle_filter(&self, dimension: &str, value: &str) -> bool {
        let (snapshot, selected) = {
            let mut active = self.lock();
            let selected = match active.iter().position(|p| p.dimension == dimension) {
                Some(index) if active[index].value == value => {
                    active.remove(index);
                    false
                }
                Some(index) => {
                    active[index].value = value.to_string();
                    true
                }
                None => {
                    active.push(FilterPredicate::new(dimension, value));
                    true
                }
            };
            (FilterSnapshot::from_predicates(active.iter().cloned()), selected)
        };
        self.notify(snapshot);
        selected
    }

    // Published after the lock is released so handlers may read or mutate
    // the filter state.
    fn notify(&self, snapshot: FilterSnapshot) {
        debug!(filters = %snapshot, "filters changed");
        let report = self.bus.publish(&DashboardEvent::filters_changed(snapshot));
        if !report.failed.is_empty() {
            debug!(failed = report.failed.len(), "some filter listeners failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ouvidoria_events::names;

    fn recorded() -> (Arc<FilterState>, Arc<Mutex<Vec<FilterSnapshot>>>) {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.on(names::FILTER_CHANGED, move |event: &DashboardEvent| {
            if let Some(filters) = event.filters() {
                sink.lock().unwrap().push(filters.clone());
            }
            Ok(())
        });
        (Arc::new(FilterState::new(bus)), seen)
    }

    #[test]
    fn test_set_replaces_in_place() {
        let (filters, seen) = recorded();
        assert!(filters.set_filter("Canal", "Telefone"));
        assert!(filters.set_filter("Tipo", "Elogio"));
        assert!(filters.set_filter("Canal", "Presencial"));

        let active = filters.get_active();
        assert_eq!(active.to_string(), "Canal=Presencial, Tipo=Elogio");
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert_eq!(seen.lock().unwrap().last(), Some(&active));
    }

    #[test]
    fn test_noop_mutations_publish_nothing() {
        let (filters, seen) = recorded();
        filters.set_filter("Canal", "Telefone");
        assert!(!filters.set_filter("Canal", "Telefone"));
        assert!(!filters.clear_filter("Tipo"));
        filters.clear_all();
        assert_eq!(filters.clear_all(), 0);

        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(seen.lock().unwrap()[1].is_empty());
    }

    #[test]
    fn test_toggle_selects_then_clears() {
        let (filters, seen) = recorded();
        assert!(filters.toggle_filter("Canal", "Telefone"));
        assert_eq!(filters.value_of("Canal").as_deref(), Some("Telefone"));

        assert!(filters.toggle_filter("Canal", "E-mail"));
        assert_eq!(filters.value_of("Canal").as_deref(), Some("E-mail"));

        assert!(!filters.toggle_filter("Canal", "E-mail"));
        assert_eq!(filters.value_of("Canal"), None);
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let (filters, _) = recorded();
        filters.set_filter("Canal", "Telefone");
        let snapshot = filters.get_active();
        filters.set_filter("Canal", "Presencial");
        assert_eq!(snapshot.get("Canal"), Some("Telefone"));
    }

    #[test]
    fn test_handler_may_read_state_during_publish() {
        let bus = Arc::new(EventBus::new());
        let filters = Arc::new(FilterState::new(Arc::clone(&bus)));
        let observed = Arc::new(Mutex::new(None));

        let reader = Arc::clone(&filters);
        let sink = Arc::clone(&observed);
        bus.on(names::FILTER_CHANGED, move |_: &DashboardEvent| {
            *sink.lock().unwrap() = reader.value_of("Tipo");
            Ok(())
        });

        filters.set_filter("Tipo", "Reclamação");
        assert_eq!(observed.lock().unwrap().as_deref(), Some("Reclamação"));
    }
}
