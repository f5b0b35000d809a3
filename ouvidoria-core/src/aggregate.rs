//! Aggregate rows returned by the aggregate API.
//!
//! Every `count-by` style endpoint answers with an ordered sequence of
//! `{ key, count }` objects. Older endpoints still emit the raw grouping
//! output `{ _id, count }`; both shapes decode into [`AggregateRow`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// One bucket of an aggregate query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRow {
    /// Bucket label. Accepts `key` or `_id`; numbers are stringified and
    /// `null` becomes an empty label.
    #[serde(alias = "_id", deserialize_with = "deserialize_key")]
    pub key: String,
    /// Number of complaints in the bucket.
    pub count: u64,
}

impl AggregateRow {
    pub fn new(key: impl Into<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            count,
        }
    }

    /// Split a sequence of rows into the parallel label/value vectors the
    /// renderer consumes.
    pub fn split(rows: &[AggregateRow]) -> (Vec<String>, Vec<f64>) {
        rows.iter()
            .map(|row| (row.key.clone(), row.count as f64))
            .unzip()
    }
}

fn deserialize_key<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => Ok(s),
        JsonValue::Null => Ok(String::new()),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "unsupported aggregate key: {}",
            other
        ))),
    }
}

/// Scalar summary served by `/api/zeladoria/stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    /// Mean resolution time, in days.
    #[serde(default)]
    pub tempo_medio_resolucao: f64,
    /// Number of closed requests.
    #[serde(default)]
    pub fechados: u64,
    /// Any other counters the endpoint reports.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}
