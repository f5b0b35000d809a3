//! HTTP client for the aggregate API.

use crate::config::DashboardConfig;
use async_trait::async_trait;
use ouvidoria_cache::AggregateSource;
use ouvidoria_core::{FetchError, ResourceRequest};
use serde_json::Value as JsonValue;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Config error: {0}")]
    Config(String),
}

/// [`AggregateSource`] backed by `GET {api_base_url}{path}?{params}`.
#[derive(Clone)]
pub struct HttpAggregateSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAggregateSource {
    pub fn new(config: &DashboardConfig) -> Result<Self, ApiClientError> {
        let base_url = config.api_base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiClientError::Config("api_base_url is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, request: &ResourceRequest) -> String {
        format!("{}{}", self.base_url, request.path())
    }
}

#[async_trait]
impl AggregateSource for HttpAggregateSource {
    async fn fetch(&self, request: &ResourceRequest) -> Result<JsonValue, FetchError> {
        let locator = request.key().to_string();
        let url = self.url_for(request);
        debug!(url = %url, params = request.params().len(), "GET aggregate");

        let response = self
            .client
            .get(url)
            .query(request.params())
            .send()
            .await
            .map_err(|err| FetchError::transport(locator.clone(), err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                locator,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<JsonValue>()
            .await
            .map_err(|err| FetchError::decode(locator, err))
    }
}
