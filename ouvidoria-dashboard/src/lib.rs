//! Ouvidoria dashboard library exports.
//!
//! Wires the shared services together: chart pages register here, filter
//! changes fan out over the event bus, and each page reloads through the
//! coalescing data loader after a short debounce.
//!
//! ```text
//! set/toggle ─► FilterState ─► "filter-changed" ─► PageFilterListener (debounced)
//!                                                      │
//!                                                      ▼
//!                        Renderer ◄── DashboardPage::reload ──► DataLoader ──► CacheStore
//! ```

pub mod api_client;
pub mod commands;
pub mod config;
pub mod connect;
pub mod context;
pub mod error;
pub mod filters;
pub mod listener;
pub mod pages;
pub mod registry;
pub mod render;
pub mod telemetry;

pub use connect::{AutoConnector, ConnectReport, SkipReason};
pub use context::AppContext;
pub use filters::FilterState;
pub use listener::{
    create_page_filter_listener, reload_fn, CacheInvalidation, PageFilterListener, ReloadFn,
    DEFAULT_DEBOUNCE,
};
pub use pages::{DashboardPage, PageStatus, StatusBoard};
pub use registry::{PageRegistration, PageRegistry};
