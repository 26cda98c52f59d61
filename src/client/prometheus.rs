//! Prometheus HTTP API client
//!
//! Speaks the read side of the Prometheus HTTP API:
//! - GET /api/v1/query
//! - GET /api/v1/query_range
//! - GET /api/v1/status/{kind}

use super::{QueryClient, Series, TimeRange};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Connection settings for [`PrometheusClient`].
#[derive(Debug, Clone)]
pub struct PrometheusClientConfig {
    /// Base URL, e.g. `https://prometheus.example:9091`
    pub url: String,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Accept self-signed or otherwise invalid TLS certificates
    pub insecure_skip_verify: bool,
}

impl Default for PrometheusClientConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9090".to_string(),
            token: None,
            timeout: Duration::from_secs(30),
            insecure_skip_verify: true,
        }
    }
}

/// Prometheus response envelope
#[derive(Debug, Deserialize)]
struct PrometheusResponse<T> {
    status: String,
    data: Option<T>,
    #[serde(rename = "errorType", default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Query payload; `result` shape depends on `resultType`
#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: serde_json::Value,
}

/// Client for a Prometheus-compatible query API
pub struct PrometheusClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl PrometheusClient {
    pub fn new(config: PrometheusClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.get(&url).query(params);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        // Prometheus reports query errors as JSON with a 4xx/5xx status.
        let envelope: PrometheusResponse<T> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(Error::Serialization(format!(
                    "invalid response from {}: {}",
                    path, e
                )));
            }
            Err(_) => {
                return Err(Error::Query(format!(
                    "HTTP {} from {}: {}",
                    status,
                    path,
                    String::from_utf8_lossy(&body)
                )));
            }
        };

        if envelope.status != "success" {
            return Err(Error::Query(format!(
                "{}: {}",
                envelope.error_type.as_deref().unwrap_or("error"),
                envelope.error.as_deref().unwrap_or("unknown error")
            )));
        }

        envelope
            .data
            .ok_or_else(|| Error::Query(format!("response from {} has no data", path)))
    }
}

/// Normalize the `result` of any result type into a list of series.
///
/// `vector` and `matrix` are already series lists; `scalar` and `string`
/// carry one bare sample and become a single unlabeled series.
fn decode_result(data: QueryData) -> Result<Vec<Series>> {
    match data.result_type.as_str() {
        "vector" | "matrix" => Ok(serde_json::from_value(data.result)?),
        "scalar" | "string" => {
            let sample = serde_json::from_value(data.result)?;
            Ok(vec![Series {
                value: Some(sample),
                ..Default::default()
            }])
        }
        other => Err(Error::Query(format!("unsupported resultType '{}'", other))),
    }
}

#[async_trait]
impl QueryClient for PrometheusClient {
    async fn instant_query(&self, expr: &str) -> Result<Vec<Series>> {
        debug!(expr, "Instant query");
        let params = [
            ("query", expr.to_string()),
            ("time", chrono::Utc::now().timestamp().to_string()),
        ];
        let data: QueryData = self.get("/api/v1/query", &params).await?;
        decode_result(data)
    }

    async fn range_query(
        &self,
        expr: &str,
        range: TimeRange,
        step: Duration,
    ) -> Result<Vec<Series>> {
        debug!(expr, start = range.start, end = range.end, step_secs = step.as_secs(), "Range query");
        let params = [
            ("query", expr.to_string()),
            ("start", range.start.to_string()),
            ("end", range.end.to_string()),
            ("step", step.as_secs().max(1).to_string()),
        ];
        let data: QueryData = self.get("/api/v1/query_range", &params).await?;
        decode_result(data)
    }

    async fn backend_status(&self, kind: &str) -> Result<serde_json::Value> {
        debug!(kind, "Backend status");
        self.get(&format!("/api/v1/status/{}", kind), &[]).await
    }
}
