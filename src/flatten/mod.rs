//! Result flattening engine
//!
//! For every declaration in a bucket the engine runs the declared query and
//! reduces the returned series into row-buffer columns according to the
//! declaration's [`ShapeKind`]:
//!
//! | shape | column key | value |
//! |---|---|---|
//! | `scalar`, `boolean` | `{name}` | first series |
//! | `per_node` | `{node_id}_{name}` | each series with a `node` label |
//! | `per_node_per_attribute` | `{node_id}_{attrs}` | each series with a `node` label |
//! | `scalar_per_attribute` | `{name}_{attrs}` | each series |
//! | `boolean_per_node` | `{node_id}_{name}` | `green` for `0`, else the declaration label |
//!
//! In instant mode values are scalars and colliding keys overwrite. In range
//! mode values are sample sequences and colliding keys concatenate.

mod keys;

pub use keys::{
    attribute_key, AttributeScope, NodeIdentityMap, DEFAULT_ATTRIBUTE_KEY, INSTANCE_LABEL,
    NODE_LABEL,
};

use crate::buffer::{Row, RowBuffer};
use crate::client::{QueryClient, Series, TimeRange};
use crate::query_set::{MetricDeclaration, QuerySets, ShapeKind};
use crate::{Error, Result};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Value written for a healthy `boolean_per_node` sample.
pub const HEALTHY_VALUE: &str = "green";

/// How each declaration is evaluated against the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// One point-in-time sample per series
    #[default]
    Instant,
    /// Every sample in a fixed window, one row per sample index
    Range,
}

impl QueryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::Instant => "instant",
            QueryMode::Range => "range",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryMode {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "instant" => Ok(QueryMode::Instant),
            "range" => Ok(QueryMode::Range),
            other => Err(format!(
                "unknown query mode '{}'; expected one of instant, range",
                other
            )),
        }
    }
}

/// What happens to the rest of a bucket after an invalid declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidDeclarationPolicy {
    /// Stop processing the bucket for the current cycle
    #[default]
    AbortBucket,
    /// Skip only the invalid declaration
    Skip,
}

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Instant or range evaluation
    pub mode: QueryMode,
    /// Window for range queries; required in range mode
    pub range: Option<TimeRange>,
    /// Step between range samples
    pub step: Duration,
    /// Maximum in-flight queries per bucket
    pub query_concurrency: usize,
    /// Handling of declarations that fail validation
    pub invalid_policy: InvalidDeclarationPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            mode: QueryMode::Instant,
            range: None,
            step: Duration::from_secs(60),
            query_concurrency: 1,
            invalid_policy: InvalidDeclarationPolicy::AbortBucket,
        }
    }
}

/// Outcome of processing one bucket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketSummary {
    pub bucket: String,
    /// Declarations whose query succeeded
    pub processed: usize,
    /// Declarations whose query or decoding failed
    pub failed: usize,
    /// Declarations rejected by validation
    pub invalid: usize,
    /// Whether processing stopped early on an invalid declaration
    pub aborted: bool,
    /// Column keys written
    pub keys_written: usize,
}

/// One failed check from [`FlatteningEngine::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub bucket: String,
    pub name: String,
    pub error: String,
}

/// Result of a validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub checked: usize,
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Flattens declared queries into a [`RowBuffer`]
pub struct FlatteningEngine {
    client: Arc<dyn QueryClient>,
    query_sets: QuerySets,
    options: EngineOptions,
    nodes: NodeIdentityMap,
    buffer: RowBuffer,
}

impl FlatteningEngine {
    /// Create an engine. Range mode requires a window and a non-zero step.
    pub fn new(
        client: Arc<dyn QueryClient>,
        query_sets: QuerySets,
        options: EngineOptions,
    ) -> Result<Self> {
        if options.mode == QueryMode::Range {
            let range = options.range.ok_or_else(|| {
                Error::TimeRange("range mode requires a start and end time".to_string())
            })?;
            if range.start > range.end {
                return Err(Error::TimeRange(format!(
                    "start {} is after end {}",
                    range.start, range.end
                )));
            }
            if options.step.is_zero() {
                return Err(Error::Config(
                    "range mode requires a non-zero interval to use as step".to_string(),
                ));
            }
        }

        debug!(
            mode = %options.mode,
            declarations = query_sets.len(),
            concurrency = options.query_concurrency,
            "Flattening engine initialized"
        );

        Ok(Self {
            client,
            query_sets,
            options,
            nodes: NodeIdentityMap::new(),
            buffer: RowBuffer::new(""),
        })
    }

    pub fn mode(&self) -> QueryMode {
        self.options.mode
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn query_sets(&self) -> &QuerySets {
        &self.query_sets
    }

    pub fn buffer(&self) -> &RowBuffer {
        &self.buffer
    }

    pub fn node_ids(&self) -> &NodeIdentityMap {
        &self.nodes
    }

    /// Start a new cycle: clear the buffer and seed `run_id`.
    pub fn reset(&mut self, run_id: impl Into<String>) {
        self.buffer.reset(run_id);
    }

    /// Align the current buffer into rows.
    pub fn commit(&self) -> Vec<Row> {
        self.buffer.commit()
    }

    /// Process every declaration of `bucket` into the row buffer.
    ///
    /// Query failures are logged and skipped, as are declarations with an
    /// unknown type. A declaration missing a field is logged and, under
    /// [`InvalidDeclarationPolicy::AbortBucket`], ends the bucket for this
    /// cycle.
    pub async fn process(&mut self, bucket: &str) -> BucketSummary {
        let mut summary = BucketSummary {
            bucket: bucket.to_string(),
            ..Default::default()
        };

        let mut declarations = Vec::new();
        for raw in self.query_sets.bucket(bucket) {
            match raw.validate() {
                Ok(declaration) => declarations.push(declaration),
                Err(e @ Error::UnsupportedShape(_)) => {
                    summary.invalid += 1;
                    error!(bucket, metric = raw.display_name(), error = %e, "Unsupported metric type");
                }
                Err(e) => {
                    summary.invalid += 1;
                    error!(bucket, metric = raw.display_name(), error = %e, "Invalid entry");
                    if self.options.invalid_policy == InvalidDeclarationPolicy::AbortBucket {
                        warn!(bucket, "Aborting remaining declarations of bucket for this cycle");
                        summary.aborted = true;
                        break;
                    }
                }
            }
        }

        let results = self.fetch_all(&declarations).await;

        for (declaration, result) in declarations.iter().zip(results) {
            match result {
                Ok(series) => match self.apply(declaration, &series) {
                    Ok(written) => {
                        summary.processed += 1;
                        summary.keys_written += written;
                    }
                    Err(e) => {
                        summary.failed += 1;
                        error!(
                            bucket,
                            metric = %declaration.name,
                            expr = %declaration.expr,
                            error = %e,
                            "Failed to process data"
                        );
                    }
                },
                Err(e) => {
                    summary.failed += 1;
                    error!(
                        bucket,
                        metric = %declaration.name,
                        expr = %declaration.expr,
                        error = %e,
                        "Failed to fetch data"
                    );
                }
            }
        }

        debug!(
            bucket,
            processed = summary.processed,
            failed = summary.failed,
            invalid = summary.invalid,
            keys = summary.keys_written,
            "Bucket processed"
        );
        summary
    }

    /// Run every declared query once without touching the row buffer.
    pub async fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        for (bucket, raws) in self.query_sets.iter() {
            for raw in raws {
                report.checked += 1;
                let outcome = match raw.validate() {
                    Ok(declaration) => self.fetch(&declaration).await.map(|series| series.len()),
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(count) => {
                        debug!(bucket, metric = raw.display_name(), series = count, "Query validated");
                    }
                    Err(e) => {
                        error!(bucket, metric = raw.display_name(), error = %e, "Failed to validate metric");
                        report.failures.push(ValidationFailure {
                            bucket: bucket.to_string(),
                            name: raw.display_name().to_string(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            checked = report.checked,
            failed = report.failures.len(),
            "Validation finished"
        );
        report
    }

    /// Fetch results for `declarations`, keeping declaration order.
    async fn fetch_all(&self, declarations: &[MetricDeclaration]) -> Vec<Result<Vec<Series>>> {
        let concurrency = self.options.query_concurrency.max(1);
        stream::iter(declarations.iter().map(|d| self.fetch(d)))
            .buffered(concurrency)
            .collect()
            .await
    }

    async fn fetch(&self, declaration: &MetricDeclaration) -> Result<Vec<Series>> {
        debug!(metric = %declaration.name, shape = %declaration.shape, "Processing metric");
        match (self.options.mode, self.options.range) {
            (QueryMode::Range, Some(range)) => {
                self.client
                    .range_query(&declaration.expr, range, self.options.step)
                    .await
            }
            _ => self.client.instant_query(&declaration.expr).await,
        }
    }

    /// Reduce `series` into the buffer. Returns the number of keys written.
    fn apply(&mut self, declaration: &MetricDeclaration, series: &[Series]) -> Result<usize> {
        let name = declaration.name.as_str();
        let mut written = 0;

        match declaration.shape {
            ShapeKind::Scalar | ShapeKind::Boolean => {
                if let Some(first) = series.first() {
                    written += self.emit(name.to_string(), first, |v| v.to_string())?;
                }
            }
            ShapeKind::ScalarPerAttribute => {
                for s in series {
                    let key = format!("{}_{}", name, attribute_key(&s.labels, AttributeScope::AllLabels));
                    written += self.emit(key, s, |v| v.to_string())?;
                }
            }
            ShapeKind::PerNode | ShapeKind::PerNodePerAttribute | ShapeKind::BooleanPerNode => {
                let fault_label = declaration.label.clone().unwrap_or_default();
                for s in series {
                    // series with an empty or missing node get no synthetic id
                    let Some(node) = s.label(NODE_LABEL).filter(|n| !n.is_empty()) else {
                        debug!(metric = name, "Skipping series without node label");
                        continue;
                    };
                    let node_id = self.nodes.resolve(node);

                    written += match declaration.shape {
                        ShapeKind::PerNodePerAttribute => {
                            let key = format!(
                                "{}_{}",
                                node_id,
                                attribute_key(&s.labels, AttributeScope::WithoutNode)
                            );
                            self.emit(key, s, |v| v.to_string())?
                        }
                        ShapeKind::BooleanPerNode => {
                            self.emit(format!("{}_{}", node_id, name), s, |v| {
                                if v == "0" {
                                    HEALTHY_VALUE.to_string()
                                } else {
                                    fault_label.clone()
                                }
                            })?
                        }
                        _ => self.emit(format!("{}_{}", node_id, name), s, |v| v.to_string())?,
                    };
                }
            }
        }

        Ok(written)
    }

    /// Write one series under `key`, mapping each raw value with `recode`.
    fn emit(
        &mut self,
        key: String,
        series: &Series,
        recode: impl Fn(&str) -> String,
    ) -> Result<usize> {
        match self.options.mode {
            QueryMode::Instant => {
                let value = series
                    .instant_value()
                    .ok_or_else(|| Error::Query("instant result has no value".to_string()))?;
                self.buffer.set(key, recode(value));
                Ok(1)
            }
            QueryMode::Range => {
                self.buffer.extend(key, series.range_values().map(&recode));
                Ok(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Cell, RUN_ID_COLUMN};
    use crate::client::StaticQueryClient;
    use crate::query_set::RawDeclaration;

    fn engine(client: StaticQueryClient, decls: Vec<RawDeclaration>) -> FlatteningEngine {
        let mut sets = QuerySets::new();
        sets.extend("features", decls);
        FlatteningEngine::new(Arc::new(client), sets, EngineOptions::default()).unwrap()
    }

    fn scalar(engine: &FlatteningEngine, key: &str) -> Option<String> {
        match engine.buffer().get(key) {
            Some(Cell::Scalar(v)) => Some(v.clone()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_scalar_takes_first_series() {
        let client = StaticQueryClient::new().with_instant(
            "cpu_usage",
            vec![Series::instant(&[], "0.42"), Series::instant(&[], "0.99")],
        );
        let mut e = engine(client, vec![RawDeclaration::new("cpu", "scalar", "cpu_usage")]);
        e.reset("r1");

        let summary = e.process("features").await;
        assert_eq!(summary.processed, 1);
        assert_eq!(scalar(&e, "cpu").as_deref(), Some("0.42"));
        assert_eq!(scalar(&e, RUN_ID_COLUMN).as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_empty_result_writes_nothing() {
        let client = StaticQueryClient::new().with_instant("absent", vec![]);
        let mut e = engine(client, vec![RawDeclaration::new("gone", "scalar", "absent")]);
        e.reset("r");

        e.process("features").await;
        assert!(e.buffer().get("gone").is_none());
    }

    #[tokio::test]
    async fn test_per_node_skips_empty_node() {
        let client = StaticQueryClient::new().with_instant(
            "up",
            vec![
                Series::instant(&[("node", "")], "1"),
                Series::instant(&[("node", "a")], "1"),
                Series::instant(&[("job", "x")], "1"),
            ],
        );
        let mut e = engine(client, vec![RawDeclaration::new("up", "per_node", "up")]);
        e.reset("r");

        let summary = e.process("features").await;
        assert_eq!(summary.keys_written, 1);
        assert_eq!(scalar(&e, "node1_up").as_deref(), Some("1"));
        assert_eq!(e.node_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_per_node_per_attribute_key() {
        let client = StaticQueryClient::new().with_instant(
            "disk",
            vec![Series::instant(
                &[("node", "n1"), ("zone", "us-east-1"), ("shard", "3")],
                "7",
            )],
        );
        let mut e = engine(
            client,
            vec![RawDeclaration::new("disk", "per_node_per_attribute", "disk")],
        );
        e.reset("r");

        e.process("features").await;
        assert_eq!(scalar(&e, "node1_us_east_1_3").as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_scalar_per_attribute_key() {
        let client = StaticQueryClient::new().with_instant(
            "scrape",
            vec![Series::instant(
                &[("instance", "10.1.2.3:9100"), ("job", "node-exporter")],
                "1",
            )],
        );
        let mut e = engine(
            client,
            vec![RawDeclaration::new("scrape", "scalar_per_attribute", "scrape")],
        );
        e.reset("r");

        e.process("features").await;
        assert_eq!(
            scalar(&e, "scrape_10_1_2_3_node_exporter").as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn test_boolean_per_node_recoding() {
        let client = StaticQueryClient::new().with_instant(
            "alerts",
            vec![
                Series::instant(&[("node", "a")], "0"),
                Series::instant(&[("node", "b")], "1"),
                Series::instant(&[("node", "c")], "3"),
            ],
        );
        let mut e = engine(
            client,
            vec![RawDeclaration::new("disk_pressure", "boolean_per_node", "alerts")
                .with_label("DiskPressure")],
        );
        e.reset("r");

        e.process("features").await;
        assert_eq!(scalar(&e, "node1_disk_pressure").as_deref(), Some("green"));
        assert_eq!(scalar(&e, "node2_disk_pressure").as_deref(), Some("DiskPressure"));
        assert_eq!(scalar(&e, "node3_disk_pressure").as_deref(), Some("DiskPressure"));
    }

    #[tokio::test]
    async fn test_boolean_keeps_raw_value() {
        let client = StaticQueryClient::new().with_instant("ok", vec![Series::instant(&[], "0")]);
        let mut e = engine(client, vec![RawDeclaration::new("healthy", "boolean", "ok")]);
        e.reset("r");

        e.process("features").await;
        assert_eq!(scalar(&e, "healthy").as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_invalid_declaration_aborts_bucket() {
        let client = StaticQueryClient::new()
            .with_instant("a", vec![Series::instant(&[], "1")])
            .with_instant("c", vec![Series::instant(&[], "3")]);
        let mut missing_expr = RawDeclaration::new("b", "scalar", "b");
        missing_expr.expr = None;
        let mut e = engine(
            client,
            vec![
                RawDeclaration::new("a", "scalar", "a"),
                missing_expr,
                RawDeclaration::new("c", "scalar", "c"),
            ],
        );
        e.reset("r");

        let summary = e.process("features").await;
        assert!(summary.aborted);
        assert_eq!(summary.invalid, 1);
        assert_eq!(scalar(&e, "a").as_deref(), Some("1"));
        assert!(e.buffer().get("c").is_none());
    }

    #[tokio::test]
    async fn test_skip_policy_continues_bucket() {
        let client = StaticQueryClient::new()
            .with_instant("a", vec![Series::instant(&[], "1")])
            .with_instant("c", vec![Series::instant(&[], "3")]);
        let mut sets = QuerySets::new();
        sets.extend(
            "features",
            vec![
                RawDeclaration::new("a", "scalar", "a"),
                RawDeclaration::new("b", "histogram", "b"),
                RawDeclaration::new("c", "scalar", "c"),
            ],
        );
        let options = EngineOptions {
            invalid_policy: InvalidDeclarationPolicy::Skip,
            ..Default::default()
        };
        let mut e = FlatteningEngine::new(Arc::new(client), sets, options).unwrap();
        e.reset("r");

        let summary = e.process("features").await;
        assert!(!summary.aborted);
        assert_eq!(summary.invalid, 1);
        assert_eq!(scalar(&e, "c").as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_unknown_type_skipped_under_default_policy() {
        let client = StaticQueryClient::new()
            .with_instant("a", vec![Series::instant(&[], "1")])
            .with_instant("c", vec![Series::instant(&[], "3")]);
        let mut e = engine(
            client,
            vec![
                RawDeclaration::new("a", "scalar", "a"),
                RawDeclaration::new("b", "gauge", "b"),
                RawDeclaration::new("c", "scalar", "c"),
            ],
        );
        e.reset("r");

        let summary = e.process("features").await;
        assert!(!summary.aborted);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.processed, 2);
        assert_eq!(scalar(&e, "a").as_deref(), Some("1"));
        assert_eq!(scalar(&e, "c").as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_instant_result_without_value_counts_as_failed() {
        let client = StaticQueryClient::new()
            .with_instant("q", vec![Series::range(&[], &["1", "2"])]);
        let mut e = engine(client, vec![RawDeclaration::new("q", "scalar", "q")]);
        e.reset("r");

        let summary = e.process("features").await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.keys_written, 0);
        assert!(e.buffer().get("q").is_none());
    }

    #[tokio::test]
    async fn test_query_failure_skips_declaration_only() {
        let client = StaticQueryClient::new()
            .with_failure("bad", "connection refused")
            .with_instant("good", vec![Series::instant(&[], "5")]);
        let mut e = engine(
            client,
            vec![
                RawDeclaration::new("bad", "scalar", "bad"),
                RawDeclaration::new("good", "scalar", "good"),
            ],
        );
        e.reset("r");

        let summary = e.process("features").await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 1);
        assert!(e.buffer().get("bad").is_none());
        assert_eq!(scalar(&e, "good").as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn test_instant_collision_last_writer_wins() {
        let client = StaticQueryClient::new().with_instant(
            "q",
            vec![
                Series::instant(&[("node", "a"), ("pod", "x")], "1"),
                Series::instant(&[("node", "a"), ("pod", "x")], "2"),
            ],
        );
        let mut e = engine(
            client,
            vec![RawDeclaration::new("q", "per_node_per_attribute", "q")],
        );
        e.reset("r");

        e.process("features").await;
        assert_eq!(scalar(&e, "node1_x").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_range_mode_collisions_concatenate() {
        let client = StaticQueryClient::new().with_range(
            "q",
            vec![
                Series::range(&[("node", "a")], &["1", "2"]),
                Series::range(&[("node", "a")], &["3"]),
            ],
        );
        let mut sets = QuerySets::new();
        sets.extend("features", vec![RawDeclaration::new("q", "per_node", "q")]);
        let options = EngineOptions {
            mode: QueryMode::Range,
            range: Some(TimeRange::new(0, 120)),
            step: Duration::from_secs(60),
            ..Default::default()
        };
        let mut e = FlatteningEngine::new(Arc::new(client), sets, options).unwrap();
        e.reset("r");

        e.process("features").await;
        assert_eq!(
            e.buffer().get("node1_q"),
            Some(&Cell::Series(vec!["1".into(), "2".into(), "3".into()]))
        );
    }

    #[tokio::test]
    async fn test_concurrent_instant_collision_follows_declaration_order() {
        // the first query answers last, declaration order must still decide
        let client = StaticQueryClient::new()
            .with_instant("first", vec![Series::instant(&[], "first")])
            .with_instant("second", vec![Series::instant(&[], "second")])
            .with_delay("first", Duration::from_millis(100));
        let mut sets = QuerySets::new();
        sets.extend(
            "features",
            vec![
                RawDeclaration::new("dup", "scalar", "first"),
                RawDeclaration::new("dup", "scalar", "second"),
            ],
        );
        let options = EngineOptions {
            query_concurrency: 4,
            ..Default::default()
        };
        let mut e = FlatteningEngine::new(Arc::new(client), sets, options).unwrap();
        e.reset("r");

        let summary = e.process("features").await;
        assert_eq!(summary.processed, 2);
        assert_eq!(scalar(&e, "dup").as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_concurrent_range_collision_concatenates_in_declaration_order() {
        let client = StaticQueryClient::new()
            .with_range("first", vec![Series::range(&[("node", "a")], &["1", "2"])])
            .with_range("second", vec![Series::range(&[("node", "a")], &["3"])])
            .with_delay("first", Duration::from_millis(100));
        let mut sets = QuerySets::new();
        sets.extend(
            "features",
            vec![
                RawDeclaration::new("q", "per_node", "first"),
                RawDeclaration::new("q", "per_node", "second"),
            ],
        );
        let options = EngineOptions {
            mode: QueryMode::Range,
            range: Some(TimeRange::new(0, 120)),
            step: Duration::from_secs(60),
            query_concurrency: 4,
            ..Default::default()
        };
        let mut e = FlatteningEngine::new(Arc::new(client), sets, options).unwrap();
        e.reset("r");

        e.process("features").await;
        assert_eq!(
            e.buffer().get("node1_q"),
            Some(&Cell::Series(vec!["1".into(), "2".into(), "3".into()]))
        );
    }

    #[tokio::test]
    async fn test_node_ids_persist_across_cycles() {
        let client = StaticQueryClient::new().with_instant(
            "up",
            vec![Series::instant(&[("node", "b")], "1")],
        );
        let mut e = engine(client, vec![RawDeclaration::new("up", "per_node", "up")]);

        e.reset("r1");
        e.process("features").await;
        e.reset("r2");
        e.process("features").await;

        assert_eq!(e.node_ids().len(), 1);
        assert_eq!(scalar(&e, "node1_up").as_deref(), Some("1"));
    }

    #[test]
    fn test_range_mode_requires_window() {
        let options = EngineOptions {
            mode: QueryMode::Range,
            ..Default::default()
        };
        let err = FlatteningEngine::new(Arc::new(StaticQueryClient::new()), QuerySets::new(), options)
            .err()
            .unwrap();
        assert!(matches!(err, Error::TimeRange(_)));
    }

    #[tokio::test]
    async fn test_validate_reports_failures() {
        let client = StaticQueryClient::new()
            .with_instant("ok", vec![Series::instant(&[], "1")])
            .with_failure("bad", "boom");
        let mut sets = QuerySets::new();
        sets.extend(
            "features",
            vec![
                RawDeclaration::new("ok", "scalar", "ok"),
                RawDeclaration::new("bad", "scalar", "bad"),
            ],
        );
        sets.extend("labels", vec![RawDeclaration::default()]);
        let e = FlatteningEngine::new(Arc::new(client), sets, EngineOptions::default()).unwrap();

        let report = e.validate().await;
        assert_eq!(report.checked, 3);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].name, "bad");
        assert_eq!(report.failures[1].bucket, "labels");
        assert_eq!(e.buffer().len(), 1);
    }
}
