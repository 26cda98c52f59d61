//! Collection cycle scheduling
//!
//! A [`Collector`] owns the flattening engine, the accumulated table and the
//! sink. One cycle resets the row buffer, processes every bucket in order,
//! commits the buffer into the table and rewrites the output file.

use crate::buffer::Table;
use crate::clock::Clock;
use crate::flatten::{BucketSummary, FlatteningEngine, QueryMode, ValidationReport};
use crate::sink::FileSink;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Outcome of one collection cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub run_id: String,
    /// Rows committed by this cycle
    pub rows: usize,
    pub buckets: Vec<BucketSummary>,
    /// File written, if any
    pub output: Option<PathBuf>,
}

/// Runs collection cycles against one engine and sink
pub struct Collector {
    engine: FlatteningEngine,
    sink: FileSink,
    table: Table,
    clock: Arc<dyn Clock>,
    interval: Duration,
    cycles: u64,
}

impl Collector {
    pub fn new(
        engine: FlatteningEngine,
        sink: FileSink,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            sink,
            table: Table::new(),
            clock,
            interval,
            cycles: 0,
        }
    }

    pub fn engine(&self) -> &FlatteningEngine {
        &self.engine
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Cycles completed so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// A zero interval or range mode runs exactly one cycle.
    pub fn is_one_shot(&self) -> bool {
        self.interval.is_zero() || self.engine.mode() == QueryMode::Range
    }

    /// Run one full collection cycle.
    ///
    /// Failures inside the cycle are logged; the cycle always completes.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let run_id = self.clock.run_stamp();
        self.engine.reset(run_id.clone());

        let bucket_names: Vec<String> = self
            .engine
            .query_sets()
            .bucket_names()
            .map(str::to_string)
            .collect();

        let mut buckets = Vec::with_capacity(bucket_names.len());
        for bucket in &bucket_names {
            buckets.push(self.engine.process(bucket).await);
        }

        let rows = self.engine.commit();
        let row_count = rows.len();
        self.table.append(rows);

        let output = match self.sink.write(&self.table).await {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, "Failed to save data");
                None
            }
        };

        self.cycles += 1;
        info!(
            run_id = %run_id,
            cycle = self.cycles,
            rows = row_count,
            total_rows = self.table.num_rows(),
            columns = self.table.num_columns(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Collection cycle completed"
        );

        CycleReport {
            run_id,
            rows: row_count,
            buckets,
            output,
        }
    }

    /// Run cycles until one-shot completion or a shutdown signal.
    ///
    /// Returns the number of cycles run.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let one_shot = self.is_one_shot();
        info!(
            interval_secs = self.interval.as_secs_f64(),
            mode = %self.engine.mode(),
            one_shot,
            "Starting collection"
        );

        let start = self.cycles;
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_cycle().await;
            if one_shot {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown channel closed");
                    }
                    info!("Shutdown requested, stopping collection");
                    break;
                }
            }
        }

        self.cycles - start
    }

    /// Execute every declaration once without writing anything.
    pub async fn validate(&self) -> ValidationReport {
        self.engine.validate().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Series, StaticQueryClient};
    use crate::clock::ManualClock;
    use crate::flatten::EngineOptions;
    use crate::query_set::{QuerySets, RawDeclaration};
    use crate::sink::SinkConfig;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn collector(dir: &std::path::Path, interval: Duration) -> Collector {
        let client = StaticQueryClient::new()
            .with_instant("cpu_usage", vec![Series::instant(&[], "0.42")]);
        let mut sets = QuerySets::new();
        sets.extend("features", vec![RawDeclaration::new("cpu", "scalar", "cpu_usage")]);

        let engine =
            FlatteningEngine::new(Arc::new(client), sets, EngineOptions::default()).unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let sink = FileSink::new(
            SinkConfig {
                output_path: dir.to_path_buf(),
                output_format: "csv".to_string(),
                compression: String::new(),
                label: "combined".to_string(),
            },
            clock.as_ref(),
        )
        .unwrap();

        Collector::new(engine, sink, clock, interval)
    }

    #[tokio::test]
    async fn test_zero_interval_runs_once() {
        let dir = tempdir().unwrap();
        let mut collector = collector(dir.path(), Duration::ZERO);
        let (_tx, rx) = watch::channel(false);

        assert!(collector.is_one_shot());
        assert_eq!(collector.run(rx).await, 1);
        assert_eq!(collector.table().num_rows(), 1);
    }

    #[tokio::test]
    async fn test_cycles_accumulate_rows() {
        let dir = tempdir().unwrap();
        let mut collector = collector(dir.path(), Duration::from_secs(60));

        let first = collector.run_cycle().await;
        let second = collector.run_cycle().await;

        assert_eq!(first.rows, 1);
        assert_eq!(first.output, second.output);
        assert_eq!(collector.table().num_rows(), 2);
        assert_eq!(collector.cycles(), 2);
        assert_eq!(first.buckets[0].processed, 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_sleep() {
        let dir = tempdir().unwrap();
        let mut collector = collector(dir.path(), Duration::from_secs(3600));
        let (tx, rx) = watch::channel(false);

        let stop = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(true).unwrap();
        };
        let (cycles, _) = tokio::join!(collector.run(rx), stop);

        assert_eq!(cycles, 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_runs_nothing() {
        let dir = tempdir().unwrap();
        let mut collector = collector(dir.path(), Duration::from_secs(60));
        let (_tx, rx) = watch::channel(true);

        assert_eq!(collector.run(rx).await, 0);
        assert!(collector.table().is_empty());
    }
}
