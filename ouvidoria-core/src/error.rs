//! Error kinds for the data loading and filter propagation path.
//!
//! None of these are fatal. A failed fetch or render degrades to a stale or
//! missing chart; a failed listener is logged and dispatch continues.

use std::sync::Arc;
use thiserror::Error;

/// Underlying cause of a transport failure.
pub type BoxedCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reaching or decoding the aggregate source.
///
/// `Clone` because one coalesced fetch result is handed to every caller that
/// was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request to {locator} failed: {source}")]
    Transport {
        locator: String,
        #[source]
        source: BoxedCause,
    },

    #[error("{locator} answered with HTTP {status}: {body}")]
    Status {
        locator: String,
        status: u16,
        body: String,
    },

    #[error("could not decode response from {locator}: {reason}")]
    Decode { locator: String, reason: String },

    #[error("fetch of {locator} was interrupted: {reason}")]
    Interrupted { locator: String, reason: String },
}

impl FetchError {
    pub fn transport<E>(locator: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            locator: locator.into(),
            source: Arc::new(source),
        }
    }

    pub fn decode(locator: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }

    /// Locator of the request that failed.
    pub fn locator(&self) -> &str {
        match self {
            Self::Transport { locator, .. }
            | Self::Status { locator, .. }
            | Self::Decode { locator, .. }
            | Self::Interrupted { locator, .. } => locator,
        }
    }
}

/// Failure inside an event bus handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListenerError {
    #[error("handler failed: {0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("no async runtime available to schedule work")]
    NoRuntime,
}

impl ListenerError {
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self::Failed(reason.to_string())
    }
}

/// Outcome of handing data to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The container is absent or hidden. Not a failure; callers treat it as
    /// a silent no-op.
    #[error("container '{0}' is not present")]
    Skipped(String),

    #[error("rendering into '{container}' failed: {reason}")]
    Failed { container: String, reason: String },
}

impl RenderError {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// Failure of a page reload function.
#[derive(Debug, Clone, Error)]
pub enum ReloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("reload of page '{page_id}' failed: {reason}")]
    Failed { page_id: String, reason: String },
}
