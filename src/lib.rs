//! # promflat
//!
//! Periodically queries a Prometheus-compatible backend and flattens the
//! results into wide tabular rows written to Parquet or CSV.
//!
//! ## Key Features
//!
//! - **Shape-driven flattening**: every metric declaration names a shape
//!   (`scalar`, `per_node`, `per_node_per_attribute`, `boolean_per_node`, ...)
//!   that decides how its series fan out into column keys
//! - **Instant and range collection**: one row per cycle, or one row per
//!   sample index over a fixed window
//! - **Stable node identities**: raw node names map to `node1`, `node2`, ...
//!   for the lifetime of the process
//!
//! ## Architecture
//!
//! - **Query sets**: YAML declaration files grouped into buckets
//! - **Flattening engine**: runs declarations through a [`client::QueryClient`]
//!   and writes column keys into a row buffer
//! - **Collector**: drives cycles, accumulates rows and rewrites the output
//!   file through the sink

pub mod buffer;
pub mod client;
pub mod clock;
pub mod config;
pub mod flatten;
pub mod query_set;
pub mod scheduler;
pub mod sink;
pub mod stats;
pub mod telemetry;

mod error;

pub use error::{Error, Result};
