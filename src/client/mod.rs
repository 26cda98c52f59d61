//! Query backend client
//!
//! The flattening engine only needs three capabilities from the metrics
//! backend: instant queries, range queries and a status lookup. They are
//! expressed by the [`QueryClient`] trait so the engine can run against
//! Prometheus over HTTP or against canned in-memory results.

mod memory;
mod prometheus;

pub use memory::StaticQueryClient;
pub use prometheus::{PrometheusClient, PrometheusClientConfig};

use crate::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use std::time::Duration;

/// Label set of a series, in the order the backend returned it.
pub type Labels = IndexMap<String, String>;

/// One `(timestamp, value)` sample. Values stay as the backend's strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "(f64, String)")]
pub struct Sample {
    pub timestamp: f64,
    pub value: String,
}

impl From<(f64, String)> for Sample {
    fn from((timestamp, value): (f64, String)) -> Self {
        Self { timestamp, value }
    }
}

/// One labeled time series from a query result.
///
/// Instant queries fill `value`; range queries fill `values`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Series {
    #[serde(rename = "metric", default)]
    pub labels: Labels,
    #[serde(default)]
    pub value: Option<Sample>,
    #[serde(default)]
    pub values: Vec<Sample>,
}

impl Series {
    /// Build an instant-query series.
    pub fn instant(labels: &[(&str, &str)], value: &str) -> Self {
        Self {
            labels: to_labels(labels),
            value: Some(Sample {
                timestamp: 0.0,
                value: value.to_string(),
            }),
            values: Vec::new(),
        }
    }

    /// Build a range-query series with one-second spaced samples.
    pub fn range(labels: &[(&str, &str)], values: &[&str]) -> Self {
        Self {
            labels: to_labels(labels),
            value: None,
            values: values
                .iter()
                .enumerate()
                .map(|(i, v)| Sample {
                    timestamp: i as f64,
                    value: v.to_string(),
                })
                .collect(),
        }
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    /// Value of an instant sample.
    pub fn instant_value(&self) -> Option<&str> {
        self.value.as_ref().map(|s| s.value.as_str())
    }

    /// Values of a range result, oldest first.
    pub fn range_values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|s| s.value.as_str())
    }
}

fn to_labels(labels: &[(&str, &str)]) -> Labels {
    labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Closed time window for range queries, in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }
}

/// Metrics backend capability consumed by the flattening engine.
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Evaluate `expr` at the current time.
    async fn instant_query(&self, expr: &str) -> Result<Vec<Series>>;

    /// Evaluate `expr` over `range` at a fixed `step`.
    async fn range_query(&self, expr: &str, range: TimeRange, step: Duration)
        -> Result<Vec<Series>>;

    /// Fetch a backend status document (e.g. `tsdb`, `buildinfo`).
    async fn backend_status(&self, kind: &str) -> Result<serde_json::Value>;
}
