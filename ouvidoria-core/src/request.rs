//! Resource requests and their canonical cache keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed aggregate request: endpoint path plus query parameters.
///
/// Parameters may come embedded in the locator (`/api/aggregate/count-by?field=Tipo`)
/// or be appended by the caller; both end up in `params` in decoded form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    path: String,
    params: Vec<(String, String)>,
}

impl ResourceRequest {
    /// Parse a resource locator. Query values are percent-decoded.
    pub fn parse(locator: &str) -> Self {
        let (path, query) = match locator.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (locator, None),
        };
        let params = query.map(parse_query).unwrap_or_default();
        Self {
            path: path.to_string(),
            params,
        }
    }

    /// Append extra parameters (filters, explicit options).
    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Canonical key: path plus parameters sorted by name then value.
    pub fn key(&self) -> RequestKey {
        let mut params = self.params.clone();
        params.sort();
        if params.is_empty() {
            return RequestKey(self.path.clone());
        }
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        RequestKey(format!("{}?{}", self.path, query))
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode_component(k), decode_component(v)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Deterministic cache key for a [`ResourceRequest`].
///
/// Logically identical requests produce identical keys regardless of the
/// order their parameters were given in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey(String);

impl RequestKey {
    /// Key for a locator with no extra parameters.
    pub fn from_locator(locator: &str) -> Self {
        ResourceRequest::parse(locator).key()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Endpoint path part of the key.
    pub fn path(&self) -> &str {
        self.0.split_once('?').map(|(p, _)| p).unwrap_or(&self.0)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
