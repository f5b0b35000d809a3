//! Ouvidoria Core - Shared Data Model
//!
//! Plain data types shared by the cache, the event bus and the dashboard:
//! aggregate rows as served by the aggregate API, the crossfilter predicate
//! model, request keys and the [`Renderer`] capability. Error kinds live in
//! [`error`].

pub mod aggregate;
pub mod error;
pub mod filter;
pub mod render;
pub mod request;

pub use aggregate::{AggregateRow, StatsSummary};
pub use error::{FetchError, ListenerError, ReloadError, RenderError};
pub use filter::{FilterPredicate, FilterSnapshot};
pub use render::{NoopRenderer, RenderOptions, Renderer};
pub use request::{RequestKey, ResourceRequest};
