//! Dashboard event payloads and their stable names.

use ouvidoria_core::FilterSnapshot;
use serde::{Deserialize, Serialize};

/// Event names agreed upon by emitters and listeners.
pub mod names {
    /// Shared filter set changed. Payload: snapshot after the change.
    pub const FILTER_CHANGED: &str = "filter-changed";
    /// Cached aggregates were dropped.
    pub const DATA_INVALIDATED: &str = "data-invalidated";
    /// A page finished a reload attempt.
    pub const PAGE_RELOADED: &str = "page-reloaded";
}

/// A payload that knows which event name it is published under.
pub trait NamedEvent {
    fn event_name(&self) -> &'static str;
}

/// How a page reload ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ReloadOutcome {
    Rendered,
    /// Container absent; nothing drawn.
    Skipped,
    /// A newer reload of the same page started first. The data was cached
    /// but not drawn.
    Superseded,
    /// Previous render kept.
    Failed(String),
}

/// Events carried on the dashboard bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DashboardEvent {
    FiltersChanged {
        filters: FilterSnapshot,
    },

    DataInvalidated {
        /// Endpoint path prefixes that were dropped.
        resources: Vec<String>,
        /// Number of cache entries removed.
        removed: usize,
    },

    PageReloaded {
        page_id: String,
        outcome: ReloadOutcome,
    },
}

impl DashboardEvent {
    pub fn filters_changed(filters: FilterSnapshot) -> Self {
        Self::FiltersChanged { filters }
    }

    /// Filter snapshot carried by a `FiltersChanged` event.
    pub fn filters(&self) -> Option<&FilterSnapshot> {
        match self {
            Self::FiltersChanged { filters } => Some(filters),
            _ => None,
        }
    }
}

impl NamedEvent for DashboardEvent {
    fn event_name(&self) -> &'static str {
        match self {
            Self::FiltersChanged { .. } => names::FILTER_CHANGED,
            Self::DataInvalidated { .. } => names::DATA_INVALIDATED,
            Self::PageReloaded { .. } => names::PAGE_RELOADED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ouvidoria_core::FilterPredicate;

    #[test]
    fn test_event_names_are_stable() {
        let filters = DashboardEvent::filters_changed(FilterSnapshot::empty());
        assert_eq!(filters.event_name(), "filter-changed");

        let invalidated = DashboardEvent::DataInvalidated {
            resources: vec!["/api/aggregate".into()],
            removed: 2,
        };
        assert_eq!(invalidated.event_name(), "data-invalidated");

        let reloaded = DashboardEvent::PageReloaded {
            page_id: "canal".into(),
            outcome: ReloadOutcome::Rendered,
        };
        assert_eq!(reloaded.event_name(), "page-reloaded");
    }

    #[test]
    fn test_serialized_shape() {
        let event = DashboardEvent::filters_changed(FilterSnapshot::from_predicates(vec![
            FilterPredicate::new("Canal", "Telefone"),
        ]));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "FiltersChanged");
        assert_eq!(json["filters"][0]["dimension"], "Canal");
    }
}
