//! Configuration file model and command-line overrides
//!
//! Settings come from a YAML file (`config.yaml` by default) with two
//! sections, `prometheus` and `collection`. Flags given on the command line
//! replace the matching file values before anything is started.

use crate::client::{PrometheusClientConfig, QueryClient, TimeRange};
use crate::flatten::{EngineOptions, InvalidDeclarationPolicy, QueryMode};
use crate::query_set::QuerySetGroup;
use crate::sink::SinkConfig;
use crate::{Error, Result};

use chrono::DateTime;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub prometheus: PrometheusSection,
    pub collection: CollectionSection,
    /// Directory of the loaded file; relative declaration paths resolve here.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// Backend connection and query sets
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrometheusSection {
    pub url: String,
    pub token: Option<String>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    pub insecure_skip_verify: bool,
    pub query_sets: Vec<QuerySetGroup>,
}

impl Default for PrometheusSection {
    fn default() -> Self {
        Self {
            url: "http://localhost:9090".to_string(),
            token: None,
            timeout: Duration::from_secs(30),
            insecure_skip_verify: true,
            query_sets: Vec::new(),
        }
    }
}

/// Collection cycle and output settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectionSection {
    pub mode: QueryMode,
    /// Pause between cycles; zero runs a single cycle. Also the range step.
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    /// Range window start, unix seconds
    #[serde(deserialize_with = "deserialize_time")]
    pub start_time: Option<i64>,
    /// Range window end, unix seconds
    #[serde(deserialize_with = "deserialize_time")]
    pub end_time: Option<i64>,
    pub output_path: PathBuf,
    pub output_format: String,
    pub compression: String,
    pub label: String,
    pub query_concurrency: usize,
    pub invalid_declaration_policy: InvalidDeclarationPolicy,
}

impl Default for CollectionSection {
    fn default() -> Self {
        Self {
            mode: QueryMode::Instant,
            interval: Duration::from_secs(60),
            start_time: None,
            end_time: None,
            output_path: PathBuf::from("data/collection"),
            output_format: "parquet".to_string(),
            compression: "snappy".to_string(),
            label: "combined".to_string(),
            query_concurrency: 1,
            invalid_declaration_policy: InvalidDeclarationPolicy::AbortBucket,
        }
    }
}

/// Values supplied on the command line. `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub interval: Option<String>,
    pub mode: Option<QueryMode>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub output_path: Option<PathBuf>,
    pub output_format: Option<String>,
    pub compression: Option<String>,
    pub token: Option<String>,
}

impl AppConfig {
    /// Load and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read config file {}: {}", path.display(), e),
            ))
        })?;

        let mut config = Self::from_yaml(&contents).map_err(|e| {
            Error::Config(format!("failed to parse config file {}: {}", path.display(), e))
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);

        info!(
            path = %path.display(),
            url = %config.prometheus.url,
            mode = %config.collection.mode,
            groups = config.prometheus.query_sets.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let parsed: Option<Self> = serde_yaml::from_str(contents)?;
        Ok(parsed.unwrap_or_default())
    }

    /// Replace file values with those given on the command line.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<()> {
        if let Some(interval) = overrides.interval {
            self.collection.interval = parse_interval(&interval)?;
        }
        if let Some(mode) = overrides.mode {
            self.collection.mode = mode;
        }
        if let Some(start) = overrides.start_time {
            self.collection.start_time = Some(parse_time(&start)?);
        }
        if let Some(end) = overrides.end_time {
            self.collection.end_time = Some(parse_time(&end)?);
        }
        if let Some(path) = overrides.output_path {
            self.collection.output_path = path;
        }
        if let Some(format) = overrides.output_format {
            self.collection.output_format = format;
        }
        if let Some(compression) = overrides.compression {
            self.collection.compression = compression;
        }
        if let Some(token) = overrides.token {
            self.prometheus.token = Some(token);
        }
        Ok(())
    }

    pub fn client_config(&self) -> PrometheusClientConfig {
        PrometheusClientConfig {
            url: self.prometheus.url.clone(),
            token: self.prometheus.token.clone().filter(|t| !t.is_empty()),
            timeout: self.prometheus.timeout,
            insecure_skip_verify: self.prometheus.insecure_skip_verify,
        }
    }

    pub fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            output_path: self.collection.output_path.clone(),
            output_format: self.collection.output_format.clone(),
            compression: self.collection.compression.clone(),
            label: self.collection.label.clone(),
        }
    }

    /// Engine settings; `range` is the resolved window for range mode.
    pub fn engine_options(&self, range: Option<TimeRange>) -> EngineOptions {
        EngineOptions {
            mode: self.collection.mode,
            range,
            step: self.collection.interval,
            query_concurrency: self.collection.query_concurrency,
            invalid_policy: self.collection.invalid_declaration_policy,
        }
    }
}

/// Parse an interval: bare digits are seconds, otherwise a duration such as
/// `90s`, `2m` or `1h`.
pub fn parse_interval(value: &str) -> Result<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Config("empty interval".to_string()));
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value)
        .map_err(|e| Error::Config(format!("invalid interval '{}': {}", value, e)))
}

/// Parse a point in time given as unix seconds or RFC 3339.
pub fn parse_time(value: &str) -> Result<i64> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return Ok(secs);
    }
    if let Ok(secs) = value.parse::<f64>() {
        return Ok(secs as i64);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.timestamp())
        .map_err(|e| Error::Config(format!("invalid time '{}': {}", value, e)))
}

/// Resolve the range-mode window.
///
/// Explicit bounds win. A missing bound is taken from the backend's TSDB
/// head block (`headStats.minTime` / `maxTime`, milliseconds).
pub async fn resolve_time_range(
    start: Option<i64>,
    end: Option<i64>,
    client: &dyn QueryClient,
) -> Result<TimeRange> {
    let (start, end) = match (start, end) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            let status = client.backend_status("tsdb").await.map_err(|e| {
                Error::TimeRange(format!("start/end not configured and tsdb status unavailable: {}", e))
            })?;
            let head = &status["headStats"];
            let min = head["minTime"].as_i64().map(|ms| ms / 1000);
            let max = head["maxTime"].as_i64().map(|ms| ms / 1000);
            match (start.or(min), end.or(max)) {
                (Some(start), Some(end)) => {
                    info!(start, end, "Range window derived from tsdb head block");
                    (start, end)
                }
                _ => {
                    return Err(Error::TimeRange(
                        "tsdb status does not report headStats minTime/maxTime".to_string(),
                    ))
                }
            }
        }
    };

    if start > end {
        return Err(Error::TimeRange(format!(
            "start {} is after end {}",
            start, end
        )));
    }
    Ok(TimeRange::new(start, end))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Int(i64),
    Float(f64),
    Text(String),
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;
    match RawValue::deserialize(deserializer)? {
        RawValue::Int(secs) if secs >= 0 => Ok(Duration::from_secs(secs as u64)),
        RawValue::Int(secs) => Err(D::Error::custom(format!("negative duration {}", secs))),
        RawValue::Float(secs) => Duration::try_from_secs_f64(secs).map_err(D::Error::custom),
        RawValue::Text(text) => parse_interval(&text).map_err(D::Error::custom),
    }
}

fn deserialize_time<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;
    match Option::<RawValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawValue::Int(secs)) => Ok(Some(secs)),
        Some(RawValue::Float(secs)) => Ok(Some(secs as i64)),
        Some(RawValue::Text(text)) => parse_time(&text).map(Some).map_err(D::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StaticQueryClient;
    use serde_json::json;

    const SAMPLE: &str = r#"
prometheus:
  url: https://prometheus.example:9091
  token: abc
  timeout: 10s
  query_sets:
    - features: [queries/features.yaml]
      labels: [queries/labels.yaml]
collection:
  mode: range
  interval: 2m
  start_time: "2024-01-01T00:00:00Z"
  end_time: 1704070800
  output_format: csv
  compression: ""
  invalid_declaration_policy: skip
"#;

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_interval("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_interval("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_interval("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_interval("0").unwrap(), Duration::ZERO);
        assert!(parse_interval("soon").is_err());
        assert!(parse_interval("").is_err());
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("1704067200").unwrap(), 1_704_067_200);
        assert_eq!(parse_time("2024-01-01T00:00:00Z").unwrap(), 1_704_067_200);
        assert_eq!(parse_time("2024-01-01T02:00:00+02:00").unwrap(), 1_704_067_200);
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_sample_config() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.prometheus.token.as_deref(), Some("abc"));
        assert_eq!(config.prometheus.timeout, Duration::from_secs(10));
        assert!(config.prometheus.insecure_skip_verify);
        assert_eq!(config.prometheus.query_sets.len(), 1);
        assert_eq!(config.prometheus.query_sets[0]["labels"].len(), 1);

        let c = &config.collection;
        assert_eq!(c.mode, QueryMode::Range);
        assert_eq!(c.interval, Duration::from_secs(120));
        assert_eq!(c.start_time, Some(1_704_067_200));
        assert_eq!(c.end_time, Some(1_704_070_800));
        assert_eq!(c.output_format, "csv");
        assert_eq!(c.label, "combined");
        assert_eq!(c.invalid_declaration_policy, InvalidDeclarationPolicy::Skip);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_yaml("").unwrap();
        assert_eq!(config.collection.interval, Duration::from_secs(60));
        assert_eq!(config.collection.compression, "snappy");
        assert_eq!(config.collection.query_concurrency, 1);
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = AppConfig::from_yaml(SAMPLE).unwrap();
        config
            .apply_overrides(ConfigOverrides {
                interval: Some("0".into()),
                mode: Some(QueryMode::Instant),
                output_format: Some("parquet".into()),
                compression: Some("zstd".into()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.collection.interval, Duration::ZERO);
        assert_eq!(config.collection.mode, QueryMode::Instant);
        assert_eq!(config.sink_config().compression, "zstd");
        // Untouched values survive
        assert_eq!(config.collection.end_time, Some(1_704_070_800));
    }

    #[test]
    fn test_load_records_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.base_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            AppConfig::load(Path::new("/nonexistent/config.yaml")),
            Err(Error::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_time_range_explicit() {
        let client = StaticQueryClient::new();
        let range = resolve_time_range(Some(10), Some(20), &client).await.unwrap();
        assert_eq!(range, TimeRange::new(10, 20));

        let err = resolve_time_range(Some(20), Some(10), &client).await.unwrap_err();
        assert!(matches!(err, Error::TimeRange(_)));
    }

    #[tokio::test]
    async fn test_time_range_from_tsdb_head() {
        let client = StaticQueryClient::new().with_status(
            "tsdb",
            json!({"headStats": {"minTime": 1_700_000_000_000i64, "maxTime": 1_700_003_600_500i64}}),
        );
        let range = resolve_time_range(None, None, &client).await.unwrap();
        assert_eq!(range, TimeRange::new(1_700_000_000, 1_700_003_600));

        let partial = resolve_time_range(Some(1_700_001_000), None, &client).await.unwrap();
        assert_eq!(partial.start, 1_700_001_000);
    }

    #[tokio::test]
    async fn test_time_range_unresolvable() {
        let client = StaticQueryClient::new();
        let err = resolve_time_range(None, Some(10), &client).await.unwrap_err();
        assert!(matches!(err, Error::TimeRange(_)));
    }
}
