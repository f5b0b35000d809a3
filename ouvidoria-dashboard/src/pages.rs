//! Dashboard pages.
//!
//! A [`DashboardPage`] owns one container. Reloading it reads the current
//! filters, loads its aggregate through the [`DataLoader`] and hands the
//! series to the renderer. A failed reload keeps whatever was drawn before
//! and is recorded on the [`StatusBoard`].
//!
//! Reloads of one page may overlap when a fetch outlives the debounce
//! window. Only the most recently started reload draws; an older one that
//! finishes later leaves its data in the cache and reports
//! [`ReloadOutcome::Superseded`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ouvidoria_cache::{DataLoader, LoadOptions};
use ouvidoria_core::{
    AggregateRow, FilterSnapshot, ReloadError, RenderError, RenderOptions, Renderer, StatsSummary,
};
use ouvidoria_events::{DashboardEvent, EventBus, ReloadOutcome};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{PageConfig, PageKind};
use crate::filters::FilterState;
use crate::listener::{reload_fn, CacheInvalidation, ReloadFn};
use crate::registry::PageRegistration;

/// Latest reload result for one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageStatus {
    pub page_id: String,
    pub last_outcome: Option<ReloadOutcome>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub reloads: u64,
    pub failures: u64,
    /// Reloads overtaken by a newer one before drawing.
    pub superseded: u64,
    /// Points in the last rendered series.
    pub points: usize,
}

impl PageStatus {
    fn new(page_id: &str) -> Self {
        Self {
            page_id: page_id.to_string(),
            last_outcome: None,
            last_attempt: None,
            last_success: None,
            reloads: 0,
            failures: 0,
            superseded: 0,
            points: 0,
        }
    }
}

/// Reload results for every page, keyed by page id.
#[derive(Debug, Default)]
pub struct StatusBoard {
    pages: Mutex<BTreeMap<String, PageStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, PageStatus>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, page_id: &str, outcome: &ReloadOutcome, points: usize) {
        let now = Utc::now();
        let mut pages = self.lock();
        let status = pages
            .entry(page_id.to_string())
            .or_insert_with(|| PageStatus::new(page_id));
        if *outcome == ReloadOutcome::Superseded {
            // The newer reload reports for this attempt.
            status.superseded += 1;
            return;
        }
        status.reloads += 1;
        status.last_attempt = Some(now);
        match outcome {
            ReloadOutcome::Rendered => {
                status.last_success = Some(now);
                status.points = points;
            }
            ReloadOutcome::Skipped | ReloadOutcome::Superseded => {}
            ReloadOutcome::Failed(_) => status.failures += 1,
        }
        status.last_outcome = Some(outcome.clone());
    }

    pub fn get(&self, page_id: &str) -> Option<PageStatus> {
        self.lock().get(page_id).cloned()
    }

    /// Every status, sorted by page id.
    pub fn all(&self) -> Vec<PageStatus> {
        self.lock().values().cloned().collect()
    }
}

/// Shared services a page needs.
#[derive(Clone)]
pub struct PageServices {
    pub loader: DataLoader,
    pub filters: Arc<FilterState>,
    pub renderer: Arc<dyn Renderer>,
    pub bus: Arc<EventBus<DashboardEvent>>,
    pub status: Arc<StatusBoard>,
}

pub struct DashboardPage {
    config: PageConfig,
    ttl: Duration,
    debounce: Duration,
    services: PageServices,
    /// Stamp of the most recently started reload.
    generation: AtomicU64,
}

impl DashboardPage {
    pub fn new(config: PageConfig, ttl: Duration, debounce: Duration, services: PageServices) -> Self {
        Self {
            config,
            ttl,
            debounce,
            services,
            generation: AtomicU64::new(0),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn container_id(&self) -> &str {
        &self.config.container
    }

    pub fn config(&self) -> &PageConfig {
        &self.config
    }

    /// Query parameters for `filters`. A chart is not narrowed by a
    /// selection on its own grouping field.
    pub fn request_params(&self, filters: &FilterSnapshot) -> Vec<(String, String)> {
        match &self.config.field {
            Some(field) => {
                let mut params = vec![("field".to_string(), field.clone())];
                params.extend(filters.without(field).to_query_params());
                params
            }
            None => filters.to_query_params(),
        }
    }

    /// Load policy for one reload. `force` skips the cache read.
    pub fn load_options(&self, filters: &FilterSnapshot, force: bool) -> LoadOptions {
        let options = if self.config.use_data_store && !force {
            LoadOptions::cached(self.ttl)
        } else {
            LoadOptions::bypass(self.ttl)
        };
        options.with_params(self.request_params(filters))
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            horizontal: self.config.horizontal,
            color_index: self.config.color_index,
            legend_container: self.config.legend_container.clone(),
            clickable_dimension: self.config.field.clone(),
        }
    }

    /// Load and draw once, propagating failures. Nothing is drawn if a
    /// newer reload started while this one was loading.
    pub async fn refresh(&self, force: bool) -> Result<(ReloadOutcome, usize), ReloadError> {
        let services = &self.services;
        if !services.renderer.has_container(&self.config.container) {
            return Ok((ReloadOutcome::Skipped, 0));
        }

        // Stamped before reading filters, so a newer stamp saw newer filters.
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let filters = services.filters.get_active();
        let options = self.load_options(&filters, force);
        let (labels, values) = match self.config.kind {
            PageKind::Chart => {
                let rows: Vec<AggregateRow> =
                    services.loader.load_as(&self.config.endpoint, &options).await?;
                AggregateRow::split(&rows)
            }
            PageKind::Stats => {
                let summary: StatsSummary =
                    services.loader.load_as(&self.config.endpoint, &options).await?;
                stats_series(&summary)
            }
        };

        if !self.is_current(generation) {
            debug!(page_id = %self.config.id, filters = %filters, "newer reload started, not drawing");
            return Ok((ReloadOutcome::Superseded, 0));
        }

        let points = labels.len();
        match services
            .renderer
            .render(&self.config.container, &labels, &values, &self.render_options())
            .await
        {
            Ok(()) => Ok((ReloadOutcome::Rendered, points)),
            Err(RenderError::Skipped(_)) => Ok((ReloadOutcome::Skipped, 0)),
            Err(err) => Err(err.into()),
        }
    }

    /// Reload, absorbing failures: the outcome is logged, recorded on the
    /// status board and published as `page-reloaded`.
    pub async fn reload(&self, force: bool) -> ReloadOutcome {
        let (outcome, points) = match self.refresh(force).await {
            Ok(result) => result,
            Err(err) => {
                warn!(page_id = %self.config.id, error = %err, "reload failed, keeping previous render");
                (ReloadOutcome::Failed(err.to_string()), 0)
            }
        };
        debug!(page_id = %self.config.id, outcome = ?outcome, points = points, "page reloaded");

        self.services.status.record(&self.config.id, &outcome, points);
        self.services.bus.publish(&DashboardEvent::PageReloaded {
            page_id: self.config.id.clone(),
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Reload function handed to the filter listener.
    pub fn reload_fn(self: &Arc<Self>) -> ReloadFn {
        let page = Arc::clone(self);
        reload_fn(move || {
            let page = Arc::clone(&page);
            async move {
                page.reload(false).await;
                Ok(())
            }
        })
    }

    /// Registration for the orchestrator.
    pub fn registration(self: &Arc<Self>) -> PageRegistration {
        let mut registration = PageRegistration::new(&self.config.id, &self.config.container)
            .with_reload(self.reload_fn())
            .with_debounce(self.debounce);
        if !self.config.invalidate_on_filter.is_empty() {
            registration = registration.with_invalidation(
                CacheInvalidation::new(
                    self.services.loader.clone(),
                    self.config.invalidate_on_filter.clone(),
                )
                .announce_on(&self.services.bus),
            );
        }
        registration
    }
}

/// Labels and values for a stats summary: the two headline figures first,
/// then any other numeric counters in key order.
pub fn stats_series(summary: &StatsSummary) -> (Vec<String>, Vec<f64>) {
    let mut labels = vec![
        "Tempo médio de resolução (dias)".to_string(),
        "Fechados".to_string(),
    ];
    let mut values = vec![summary.tempo_medio_resolucao, summary.fechados as f64];

    let mut extra: Vec<(&String, f64)> = summary
        .extra
        .iter()
        .filter_map(|(key, value)| value.as_f64().map(|v| (key, v)))
        .collect();
    extra.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in extra {
        labels.push(key.clone());
        values.push(value);
    }
    (labels, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ouvidoria_cache::CacheStore;
    use ouvidoria_events::names;
    use ouvidoria_test_utils::{assertions, fixtures, FakeAggregateSource, RecordingRenderer};

    struct Harness {
        source: Arc<FakeAggregateSource>,
        renderer: Arc<RecordingRenderer>,
        services: PageServices,
    }

    fn harness(renderer: RecordingRenderer) -> Harness {
        let source = Arc::new(FakeAggregateSource::new());
        source.respond_with(fixtures::COUNT_BY, fixtures::echo_count_by);
        source.respond(fixtures::STATS, fixtures::stats_body(4.5, 120));
        let renderer = Arc::new(renderer);
        let bus = Arc::new(EventBus::new());
        let services = PageServices {
            loader: DataLoader::new(source.clone(), Arc::new(CacheStore::new())),
            filters: Arc::new(FilterState::new(Arc::clone(&bus))),
            renderer: renderer.clone(),
            bus,
            status: Arc::new(StatusBoard::new()),
        };
        Harness {
            source,
            renderer,
            services,
        }
    }

    fn chart(id: &str, container: &str, field: &str) -> PageConfig {
        PageConfig {
            id: id.to_string(),
            container: container.to_string(),
            endpoint: fixtures::COUNT_BY.to_string(),
            field: Some(field.to_string()),
            kind: PageKind::Chart,
            ttl_ms: None,
            use_data_store: true,
            horizontal: false,
            color_index: 0,
            legend_container: None,
            invalidate_on_filter: Vec::new(),
            debounce_ms: None,
        }
    }

    fn stats(id: &str, container: &str) -> PageConfig {
        PageConfig {
            endpoint: fixtures::STATS.to_string(),
            field: None,
            kind: PageKind::Stats,
            ..chart(id, container, "unused")
        }
    }

    fn page(config: PageConfig, services: &PageServices) -> Arc<DashboardPage> {
        Arc::new(DashboardPage::new(
            config,
            Duration::from_secs(600),
            Duration::from_millis(500),
            services.clone(),
        ))
    }

    #[tokio::test]
    async fn test_chart_excludes_own_dimension() {
        let h = harness(RecordingRenderer::new());
        h.services.filters.set_filter("Canal", "Telefone");
        h.services.filters.set_filter("Tipo", "Elogio");

        let canal = page(chart("canal", "chartCanal", "Canal"), &h.services);
        assert_eq!(canal.reload(false).await, ReloadOutcome::Rendered);

        let request = &h.source.calls()[0];
        assert_eq!(
            request.params(),
            &[
                ("field".to_string(), "Canal".to_string()),
                ("Tipo".to_string(), "Elogio".to_string()),
            ]
        );
        assertions::assert_last_labels(&h.renderer, "chartCanal", &["field=Canal&Tipo=Elogio"]);
        let call = h.renderer.last_for("chartCanal").unwrap();
        assert_eq!(call.options.clickable_dimension.as_deref(), Some("Canal"));
    }

    #[tokio::test]
    async fn test_stats_page_renders_summary() {
        let h = harness(RecordingRenderer::new());
        let page = page(stats("stats", "zeladoriaStats"), &h.services);

        assert_eq!(page.reload(false).await, ReloadOutcome::Rendered);
        let call = h.renderer.last_for("zeladoriaStats").unwrap();
        assert_eq!(call.values, vec![4.5, 120.0]);
        assert_eq!(h.services.status.get("stats").unwrap().points, 2);
    }

    #[tokio::test]
    async fn test_missing_container_skips_without_fetching() {
        let h = harness(RecordingRenderer::with_containers(["chartTipo"]));
        let canal = page(chart("canal", "chartCanal", "Canal"), &h.services);

        assert_eq!(canal.reload(false).await, ReloadOutcome::Skipped);
        assert_eq!(h.source.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_render() {
        let h = harness(RecordingRenderer::new());
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        h.services.bus.on(names::PAGE_RELOADED, move |event: &DashboardEvent| {
            if let DashboardEvent::PageReloaded { outcome, .. } = event {
                sink.lock().unwrap().push(outcome.clone());
            }
            Ok(())
        });

        let canal = page(chart("canal", "chartCanal", "Canal"), &h.services);
        canal.reload(false).await;

        h.source.fail(fixtures::COUNT_BY);
        h.services.filters.set_filter("Tipo", "Elogio");
        let outcome = canal.reload(false).await;
        assert!(matches!(outcome, ReloadOutcome::Failed(_)));

        assertions::assert_render_count(&h.renderer, "chartCanal", 1);
        let status = h.services.status.get("canal").unwrap();
        assert_eq!(status.reloads, 2);
        assert_eq!(status.failures, 1);
        assert!(status.last_success.is_some());
        assert_eq!(outcomes.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_force_bypasses_cache() {
        let h = harness(RecordingRenderer::new());
        let canal = page(chart("canal", "chartCanal", "Canal"), &h.services);

        canal.reload(false).await;
        canal.reload(false).await;
        assert_eq!(h.source.call_count(), 1);

        canal.reload(true).await;
        assert_eq!(h.source.call_count(), 2);
        assertions::assert_render_count(&h.renderer, "chartCanal", 3);
    }

    #[tokio::test]
    async fn test_render_failure_is_recorded() {
        let h = harness(RecordingRenderer::new());
        h.renderer.fail_container("chartCanal");
        let canal = page(chart("canal", "chartCanal", "Canal"), &h.services);

        let outcome = canal.reload(false).await;
        assert!(matches!(outcome, ReloadOutcome::Failed(reason) if reason.contains("chartCanal")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_older_reload_does_not_draw_over_newer() {
        let h = harness(RecordingRenderer::new());
        h.source.delay_when("Canal", "Telefone", Duration::from_secs(1));
        let tipo = page(chart("tipo", "chartTipo", "Tipo"), &h.services);

        h.services.filters.set_filter("Canal", "Telefone");
        let older = tokio::spawn({
            let tipo = Arc::clone(&tipo);
            async move { tipo.reload(false).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.services.filters.set_filter("Canal", "E-mail");
        assert_eq!(tipo.reload(false).await, ReloadOutcome::Rendered);
        assert_eq!(older.await.unwrap(), ReloadOutcome::Superseded);

        assertions::assert_render_count(&h.renderer, "chartTipo", 1);
        assertions::assert_last_labels(&h.renderer, "chartTipo", &["field=Tipo&Canal=E-mail"]);
        let status = h.services.status.get("tipo").unwrap();
        assert_eq!(status.last_outcome, Some(ReloadOutcome::Rendered));
        assert_eq!((status.reloads, status.superseded), (1, 1));

        // The overtaken fetch still landed in the cache.
        h.services.filters.set_filter("Canal", "Telefone");
        assert_eq!(tipo.reload(false).await, ReloadOutcome::Rendered);
        assert_eq!(h.source.call_count(), 2);
        assertions::assert_last_labels(&h.renderer, "chartTipo", &["field=Tipo&Canal=Telefone"]);
    }

    #[test]
    fn test_registration_carries_invalidation() {
        let h = harness(RecordingRenderer::new());
        let mut config = chart("canal", "chartCanal", "Canal");
        config.invalidate_on_filter = vec!["/api/aggregate".to_string()];
        let registration = page(config, &h.services).registration();

        assert!(registration.reload.is_some());
        assert_eq!(registration.debounce, Some(Duration::from_millis(500)));
        assert_eq!(
            registration.invalidation.as_ref().map(|i| i.resources().to_vec()),
            Some(vec!["/api/aggregate".to_string()])
        );
    }

    #[test]
    fn test_stats_series_orders_extras() {
        let summary: StatsSummary = serde_json::from_value(serde_json::json!({
            "tempoMedioResolucao": 2.0,
            "fechados": 10,
            "vencidos": 3,
            "abertos": 7,
            "fonte": "mongo"
        }))
        .unwrap();
        let (labels, values) = stats_series(&summary);
        assert_eq!(labels[2..], ["abertos".to_string(), "vencidos".to_string()]);
        assert_eq!(values, vec![2.0, 10.0, 7.0, 3.0]);
    }
}
