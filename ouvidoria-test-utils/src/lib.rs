//! Ouvidoria Test Utilities
//!
//! Shared test infrastructure for the Ouvidoria workspace:
//! - Fake aggregate source and recording renderer
//! - Proptest generators for filter predicates and filter mutations
//! - Response body fixtures shaped like the aggregate API
//! - Assertions over recorded renders

pub use ouvidoria_cache::{AggregateSource, CacheStore, DataLoader, LoadOptions, Payload};
pub use ouvidoria_core::{
    AggregateRow, FetchError, FilterPredicate, FilterSnapshot, RenderError, RenderOptions,
    Renderer, RequestKey, ResourceRequest, StatsSummary,
};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// FAKE COLLABORATORS
// ============================================================================

type Responder = Arc<dyn Fn(&ResourceRequest) -> JsonValue + Send + Sync>;

/// In-memory aggregate source.
///
/// Responses are registered per endpoint path. Every fetch is recorded, and an
/// optional delay keeps fetches pending long enough to observe coalescing.
/// Requests carrying a given parameter can be held longer than the rest.
#[derive(Default)]
pub struct FakeAggregateSource {
    responders: Mutex<HashMap<String, Responder>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<ResourceRequest>>,
    delay: Duration,
    slow: Mutex<Vec<(String, String, Duration)>>,
}

impl FakeAggregateSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every fetch for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Hold requests carrying `name=value` for `delay` instead of the default.
    pub fn delay_when(&self, name: &str, value: &str, delay: Duration) -> &Self {
        lock(&self.slow).push((name.to_string(), value.to_string(), delay));
        self
    }

    fn delay_for(&self, request: &ResourceRequest) -> Duration {
        lock(&self.slow)
            .iter()
            .find(|(name, value, _)| {
                request
                    .params()
                    .iter()
                    .any(|(k, v)| k == name && v == value)
            })
            .map_or(self.delay, |(_, _, delay)| *delay)
    }

    /// Answer `path` with a fixed body.
    pub fn respond(&self, path: &str, body: JsonValue) -> &Self {
        self.respond_with(path, move |_| body.clone())
    }

    /// Answer `path` with a body computed from the request.
    pub fn respond_with<F>(&self, path: &str, responder: F) -> &Self
    where
        F: Fn(&ResourceRequest) -> JsonValue + Send + Sync + 'static,
    {
        lock(&self.responders).insert(path.to_string(), Arc::new(responder));
        self
    }

    /// Make fetches of `path` fail with HTTP 503 until [`recover`](Self::recover).
    pub fn fail(&self, path: &str) -> &Self {
        lock(&self.failing).insert(path.to_string());
        self
    }

    pub fn recover(&self, path: &str) -> &Self {
        lock(&self.failing).remove(path);
        self
    }

    /// Every request seen so far, in arrival order.
    pub fn calls(&self) -> Vec<ResourceRequest> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Requests seen for one endpoint path.
    pub fn calls_for(&self, path: &str) -> Vec<ResourceRequest> {
        lock(&self.calls)
            .iter()
            .filter(|request| request.path() == path)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AggregateSource for FakeAggregateSource {
    async fn fetch(&self, request: &ResourceRequest) -> Result<JsonValue, FetchError> {
        lock(&self.calls).push(request.clone());

        let delay = self.delay_for(request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let locator = request.key().to_string();
        if lock(&self.failing).contains(request.path()) {
            return Err(FetchError::Status {
                locator,
                status: 503,
                body: "service unavailable".to_string(),
            });
        }

        let responder = lock(&self.responders).get(request.path()).cloned();
        match responder {
            Some(responder) => Ok(responder(request)),
            None => Err(FetchError::Status {
                locator,
                status: 404,
                body: "not found".to_string(),
            }),
        }
    }
}

/// One call recorded by [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderCall {
    pub container_id: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub options: RenderOptions,
}

/// Renderer that records every successful render.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    /// `None` means every container is present.
    containers: Option<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<RenderCall>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the listed containers are present.
    pub fn with_containers<I, S>(containers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            containers: Some(containers.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Make renders into `container_id` fail.
    pub fn fail_container(&self, container_id: &str) {
        lock(&self.failing).insert(container_id.to_string());
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_for(&self, container_id: &str) -> Vec<RenderCall> {
        lock(&self.calls)
            .iter()
            .filter(|call| call.container_id == container_id)
            .cloned()
            .collect()
    }

    /// Most recent render into `container_id`.
    pub fn last_for(&self, container_id: &str) -> Option<RenderCall> {
        lock(&self.calls)
            .iter()
            .rev()
            .find(|call| call.container_id == container_id)
            .cloned()
    }
}

#[async_trait]
impl Renderer for RecordingRenderer {
    fn has_container(&self, container_id: &str) -> bool {
        self.containers
            .as_ref()
            .map_or(true, |containers| containers.contains(container_id))
    }

    async fn render(
        &self,
        container_id: &str,
        labels: &[String],
        values: &[f64],
        options: &RenderOptions,
    ) -> Result<(), RenderError> {
        if !self.has_container(container_id) {
            return Err(RenderError::Skipped(container_id.to_string()));
        }
        if lock(&self.failing).contains(container_id) {
            return Err(RenderError::Failed {
                container: container_id.to_string(),
                reason: "renderer rejected the data".to_string(),
            });
        }
        lock(&self.calls).push(RenderCall {
            container_id: container_id.to_string(),
            labels: labels.to_vec(),
            values: values.to_vec(),
            options: options.clone(),
        });
        Ok(())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for filter types.

    use super::*;
    use proptest::prelude::*;

    /// Dimensions the dashboard filters on.
    pub const DIMENSIONS: &[&str] = &["Canal", "Tipo", "Status", "Secretaria", "Bairro", "Tema"];

    /// A mutation applied to the shared filter state.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum FilterOp {
        Set(String, String),
        Toggle(String, String),
        Clear(String),
        ClearAll,
    }

    pub fn arb_dimension() -> impl Strategy<Value = String> {
        prop::sample::select(DIMENSIONS).prop_map(str::to_string)
    }

    /// Short category labels, including multi-word ones.
    pub fn arb_value() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("Telefone".to_string()),
            Just("Presencial".to_string()),
            Just("E-mail".to_string()),
            Just("Elogio".to_string()),
            Just("Reclamação".to_string()),
            "[A-Z][a-z]{1,8}( [A-Z][a-z]{1,8})?",
        ]
    }

    pub fn arb_predicate() -> impl Strategy<Value = FilterPredicate> {
        (arb_dimension(), arb_value()).prop_map(|(d, v)| FilterPredicate::new(d, v))
    }

    pub fn arb_filter_op() -> impl Strategy<Value = FilterOp> {
        prop_oneof![
            4 => (arb_dimension(), arb_value()).prop_map(|(d, v)| FilterOp::Set(d, v)),
            3 => (arb_dimension(), arb_value()).prop_map(|(d, v)| FilterOp::Toggle(d, v)),
            2 => arb_dimension().prop_map(FilterOp::Clear),
            1 => Just(FilterOp::ClearAll),
        ]
    }

    pub fn arb_filter_ops(max: usize) -> impl Strategy<Value = Vec<FilterOp>> {
        prop::collection::vec(arb_filter_op(), 0..max)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Response bodies shaped like the aggregate API.

    use super::*;
    use serde_json::json;

    pub const COUNT_BY: &str = "/api/aggregate/count-by";
    pub const STATS: &str = "/api/zeladoria/stats";

    /// `[{"key": .., "count": ..}, ..]`
    pub fn count_by_body(rows: &[(&str, u64)]) -> JsonValue {
        JsonValue::Array(
            rows.iter()
                .map(|(key, count)| json!({ "key": key, "count": count }))
                .collect(),
        )
    }

    /// Same shape, keyed by `_id` as Mongo aggregations return it.
    pub fn count_by_id_body(rows: &[(&str, u64)]) -> JsonValue {
        JsonValue::Array(
            rows.iter()
                .map(|(key, count)| json!({ "_id": key, "count": count }))
                .collect(),
        )
    }

    pub fn canal_body() -> JsonValue {
        count_by_body(&[("Telefone", 120), ("Presencial", 48), ("E-mail", 31)])
    }

    pub fn stats_body(tempo_medio_resolucao: f64, fechados: u64) -> JsonValue {
        json!({
            "tempoMedioResolucao": tempo_medio_resolucao,
            "fechados": fechados,
        })
    }

    /// Count-by responder that echoes the requested field and filters back as
    /// a single row, so tests can see which parameters reached the source.
    pub fn echo_count_by(request: &ResourceRequest) -> JsonValue {
        let label = request
            .params()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        count_by_body(&[(label.as_str(), 1)])
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over recorded renders.

    use super::*;

    /// Assert that the last render into `container_id` showed `labels`.
    #[track_caller]
    pub fn assert_last_labels(renderer: &RecordingRenderer, container_id: &str, labels: &[&str]) {
        let call = renderer
            .last_for(container_id)
            .unwrap_or_else(|| panic!("nothing rendered into {}", container_id));
        let expected: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        assert_eq!(call.labels, expected, "labels rendered into {}", container_id);
    }

    /// Assert that `container_id` was rendered exactly `count` times.
    #[track_caller]
    pub fn assert_render_count(renderer: &RecordingRenderer, container_id: &str, count: usize) {
        let actual = renderer.calls_for(container_id).len();
        assert_eq!(actual, count, "renders into {}", container_id);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_fake_source_records_and_answers() {
        let source = FakeAggregateSource::new();
        source.respond(fixtures::COUNT_BY, fixtures::canal_body());

        let request = ResourceRequest::parse("/api/aggregate/count-by?field=Canal");
        let body = source.fetch(&request).await.unwrap();

        assert_eq!(body, fixtures::canal_body());
        assert_eq!(source.call_count(), 1);
        assert_eq!(source.calls_for(fixtures::COUNT_BY)[0].params()[0].1, "Canal");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fake_source_delays_matching_requests() {
        let source = FakeAggregateSource::new().with_delay(Duration::from_millis(10));
        source.respond_with(fixtures::COUNT_BY, fixtures::echo_count_by);
        source.delay_when("Canal", "Telefone", Duration::from_secs(1));

        let start = tokio::time::Instant::now();
        let slow = ResourceRequest::parse("/api/aggregate/count-by?field=Tipo&Canal=Telefone");
        source.fetch(&slow).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(1));

        let start = tokio::time::Instant::now();
        let fast = ResourceRequest::parse("/api/aggregate/count-by?field=Tipo&Canal=E-mail");
        source.fetch(&fast).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_fake_source_failure_and_missing_path() {
        let source = FakeAggregateSource::new();
        source.respond(fixtures::STATS, fixtures::stats_body(4.5, 10));
        source.fail(fixtures::STATS);

        let stats = ResourceRequest::parse(fixtures::STATS);
        assert!(matches!(
            source.fetch(&stats).await,
            Err(FetchError::Status { status: 503, .. })
        ));

        source.recover(fixtures::STATS);
        assert!(source.fetch(&stats).await.is_ok());

        let unknown = ResourceRequest::parse("/api/unknown");
        assert!(matches!(
            source.fetch(&unknown).await,
            Err(FetchError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_recording_renderer_respects_containers() {
        let renderer = RecordingRenderer::with_containers(["chartCanal"]);
        let labels = vec!["Telefone".to_string()];
        let values = vec![3.0];
        let options = RenderOptions::default();

        assert!(renderer
            .render("chartCanal", &labels, &values, &options)
            .await
            .is_ok());
        let skipped = renderer
            .render("chartTipo", &labels, &values, &options)
            .await
            .unwrap_err();
        assert!(skipped.is_skipped());

        renderer.fail_container("chartCanal");
        assert!(renderer
            .render("chartCanal", &labels, &values, &options)
            .await
            .is_err());

        assertions::assert_render_count(&renderer, "chartCanal", 1);
        assertions::assert_last_labels(&renderer, "chartCanal", &["Telefone"]);
    }

    #[test]
    fn test_fixture_bodies_decode() {
        let rows: Vec<AggregateRow> = serde_json::from_value(fixtures::canal_body()).unwrap();
        assert_eq!(rows.len(), 3);
        let rows: Vec<AggregateRow> =
            serde_json::from_value(fixtures::count_by_id_body(&[("Centro", 4)])).unwrap();
        assert_eq!(rows[0], AggregateRow::new("Centro", 4));

        let stats: StatsSummary = serde_json::from_value(fixtures::stats_body(3.25, 40)).unwrap();
        assert_eq!(stats.fechados, 40);
    }

    proptest! {
        #[test]
        fn generated_predicates_use_known_dimensions(predicate in generators::arb_predicate()) {
            prop_assert!(generators::DIMENSIONS.contains(&predicate.dimension.as_str()));
            prop_assert!(!predicate.value.is_empty());
        }
    }
}
