//! promflat collector binary
//!
//! Loads the configuration and query sets, then runs collection cycles until
//! the one-shot cycle finishes or a shutdown signal arrives.

use promflat::client::PrometheusClient;
use promflat::clock::{Clock, SystemClock};
use promflat::config::{resolve_time_range, AppConfig, ConfigOverrides, DEFAULT_CONFIG_PATH};
use promflat::flatten::{FlatteningEngine, QueryMode};
use promflat::query_set::load_query_sets;
use promflat::scheduler::Collector;
use promflat::sink::FileSink;
use promflat::stats::FileStats;
use promflat::telemetry::{self, LogFormat};

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Periodic Prometheus query flattener
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(long, env = "PROMFLAT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run every declared query once and report failures, without writing
    #[arg(long)]
    validate: bool,

    /// Pause between cycles: bare seconds or a duration such as 90s, 2m, 1h
    #[arg(long)]
    interval: Option<String>,

    /// Query mode: instant or range
    #[arg(long)]
    mode: Option<QueryMode>,

    /// Range window start (RFC 3339 or unix seconds)
    #[arg(long = "start_time")]
    start_time: Option<String>,

    /// Range window end (RFC 3339 or unix seconds)
    #[arg(long = "end_time")]
    end_time: Option<String>,

    /// Output directory
    #[arg(long = "output_path")]
    output_path: Option<PathBuf>,

    /// Output format: parquet or csv
    #[arg(long = "output_format")]
    output_format: Option<String>,

    /// Parquet codec: "", snappy, gzip, brotli, lz4, zstd
    #[arg(long)]
    compression: Option<String>,

    /// Bearer token for the query backend
    #[arg(long, env = "PROMETHEUS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Print statistics for --filename and exit
    #[arg(long, requires = "filename")]
    stats: bool,

    /// File inspected by --stats
    #[arg(long)]
    filename: Option<PathBuf>,

    /// Log level
    #[arg(long = "log_level", default_value = "info")]
    log_level: String,

    /// Log format: text or json
    #[arg(long = "log_format", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    telemetry::init_logging(&args.log_level, args.log_format)?;

    if args.stats {
        let filename = args.filename.context("--stats requires --filename")?;
        let stats = FileStats::from_path(&filename)
            .with_context(|| format!("failed to inspect {}", filename.display()))?;
        println!("{}", stats);
        return Ok(());
    }

    info!("Starting promflat");

    let mut config = AppConfig::load(&args.config)
        .with_context(|| format!("failed to load configuration {}", args.config.display()))?;
    config.apply_overrides(ConfigOverrides {
        interval: args.interval,
        mode: args.mode,
        start_time: args.start_time,
        end_time: args.end_time,
        output_path: args.output_path,
        output_format: args.output_format,
        compression: args.compression,
        token: args.token,
    })?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let sink = FileSink::new(config.sink_config(), clock.as_ref())
        .context("invalid output configuration")?;

    let query_sets = load_query_sets(&config.prometheus.query_sets, config.base_dir.as_deref())
        .context("failed to load query sets")?;

    let client = Arc::new(PrometheusClient::new(config.client_config())?);
    info!(url = %client.base_url(), "Query backend configured");

    let range = match config.collection.mode {
        QueryMode::Range => Some(
            resolve_time_range(
                config.collection.start_time,
                config.collection.end_time,
                client.as_ref(),
            )
            .await
            .context("failed to resolve range window")?,
        ),
        QueryMode::Instant => None,
    };

    let engine = FlatteningEngine::new(client, query_sets, config.engine_options(range))?;
    let mut collector = Collector::new(engine, sink, clock, config.collection.interval);

    if args.validate {
        let report = collector.validate().await;
        for failure in &report.failures {
            error!(
                bucket = %failure.bucket,
                metric = %failure.name,
                error = %failure.error,
                "Validation failed"
            );
        }
        if !report.is_ok() {
            bail!(
                "{} of {} declarations failed validation",
                report.failures.len(),
                report.checked
            );
        }
        info!(checked = report.checked, "All declarations validated");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let cycles = collector.run(shutdown_rx).await;

    info!(cycles, rows = collector.table().num_rows(), "promflat shutting down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
