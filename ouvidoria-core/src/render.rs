//! Chart rendering capability.
//!
//! Pages never draw anything themselves. They hand labels and values to a
//! [`Renderer`] together with [`RenderOptions`], and the renderer decides how
//! the chart is shown. The headless dashboard prints text bars; tests record
//! the calls.

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Presentation hints passed alongside the data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Draw bars horizontally.
    #[serde(default)]
    pub horizontal: bool,
    /// Index into the renderer's palette.
    #[serde(default)]
    pub color_index: usize,
    /// Separate container for the legend, when the page has one.
    #[serde(default)]
    pub legend_container: Option<String>,
    /// Dimension toggled when a bar is clicked. `None` disables crossfilter
    /// clicks for the chart.
    #[serde(default)]
    pub clickable_dimension: Option<String>,
}

impl RenderOptions {
    pub fn horizontal(mut self, horizontal: bool) -> Self {
        self.horizontal = horizontal;
        self
    }

    pub fn color_index(mut self, color_index: usize) -> Self {
        self.color_index = color_index;
        self
    }

    pub fn clickable(mut self, dimension: impl Into<String>) -> Self {
        self.clickable_dimension = Some(dimension.into());
        self
    }
}

/// Something that can draw a labelled series into a named container.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Whether `container_id` exists and is visible. Pages whose container is
    /// absent are not wired to filter changes.
    fn has_container(&self, container_id: &str) -> bool;

    /// Draw `values` against `labels` into `container_id`.
    ///
    /// `labels` and `values` have equal length. An absent container yields
    /// [`RenderError::Skipped`], which callers treat as a silent no-op.
    async fn render(
        &self,
        container_id: &str,
        labels: &[String],
        values: &[f64],
        options: &RenderOptions,
    ) -> Result<(), RenderError>;
}

/// Renderer that accepts every container and draws nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRenderer;

#[async_trait::async_trait]
impl Renderer for NoopRenderer {
    fn has_container(&self, _container_id: &str) -> bool {
        true
    }

    async fn render(
        &self,
        _container_id: &str,
        _labels: &[String],
        _values: &[f64],
        _options: &RenderOptions,
    ) -> Result<(), RenderError> {
        Ok(())
    }
}
