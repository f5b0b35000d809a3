//! Ouvidoria Events - Publish/Subscribe Bus
//!
//! Decouples charts that produce selections from pages that consume them.
//!
//! # Dispatch model
//!
//! - Named events, each with an ordered list of handlers
//! - `emit` is synchronous and follows subscription order
//! - A failing or panicking handler is logged and skipped; the rest still run
//! - Every registration returns an [`Unsubscribe`] handle; calling it twice
//!   is a no-op
//!
//! ```text
//! chart click ─► FilterState ─► emit("filter-changed") ─► page listener 1
//!                                                      ─► page listener 2
//!                                                      ─► ...
//! ```

mod bus;
mod event;

pub use bus::{EmitReport, EventBus, Handler, SubscriptionId, Unsubscribe};
pub use event::{names, DashboardEvent, NamedEvent, ReloadOutcome};
