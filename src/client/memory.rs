//! In-memory query client for development and testing
//!
//! Serves canned results keyed by query expression and records every
//! expression it was asked for.

use super::{QueryClient, Series, TimeRange};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Canned {
    Series(Vec<Series>),
    Failure(String),
}

impl Canned {
    fn resolve(&self) -> Result<Vec<Series>> {
        match self {
            Canned::Series(series) => Ok(series.clone()),
            Canned::Failure(msg) => Err(Error::Query(msg.clone())),
        }
    }
}

/// Query client that answers from fixed, pre-registered results
#[derive(Debug, Default)]
pub struct StaticQueryClient {
    instant: RwLock<HashMap<String, Canned>>,
    range: RwLock<HashMap<String, Canned>>,
    status: RwLock<HashMap<String, serde_json::Value>>,
    delays: RwLock<HashMap<String, Duration>>,
    calls: RwLock<Vec<String>>,
}

impl StaticQueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the instant result for `expr`.
    pub fn with_instant(self, expr: &str, series: Vec<Series>) -> Self {
        self.instant
            .write()
            .insert(expr.to_string(), Canned::Series(series));
        self
    }

    /// Register the range result for `expr`.
    pub fn with_range(self, expr: &str, series: Vec<Series>) -> Self {
        self.range
            .write()
            .insert(expr.to_string(), Canned::Series(series));
        self
    }

    /// Make both instant and range queries for `expr` fail.
    pub fn with_failure(self, expr: &str, message: &str) -> Self {
        let canned = Canned::Failure(message.to_string());
        self.instant.write().insert(expr.to_string(), canned.clone());
        self.range.write().insert(expr.to_string(), canned);
        self
    }

    /// Register the document returned by `backend_status(kind)`.
    pub fn with_status(self, kind: &str, document: serde_json::Value) -> Self {
        self.status.write().insert(kind.to_string(), document);
        self
    }

    /// Hold every answer for `expr` back by `delay`.
    pub fn with_delay(self, expr: &str, delay: Duration) -> Self {
        self.delays.write().insert(expr.to_string(), delay);
        self
    }

    /// Expressions queried so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().clone()
    }

    async fn lookup(
        &self,
        table: &RwLock<HashMap<String, Canned>>,
        expr: &str,
    ) -> Result<Vec<Series>> {
        self.calls.write().push(expr.to_string());
        let delay = self.delays.read().get(expr).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match table.read().get(expr) {
            Some(canned) => canned.resolve(),
            None => Err(Error::Query(format!("no result registered for '{}'", expr))),
        }
    }
}

#[async_trait]
impl QueryClient for StaticQueryClient {
    async fn instant_query(&self, expr: &str) -> Result<Vec<Series>> {
        self.lookup(&self.instant, expr).await
    }

    async fn range_query(
        &self,
        expr: &str,
        _range: TimeRange,
        _step: Duration,
    ) -> Result<Vec<Series>> {
        self.lookup(&self.range, expr).await
    }

    async fn backend_status(&self, kind: &str) -> Result<serde_json::Value> {
        self.status
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::Query(format!("no status registered for '{}'", kind)))
    }
}
