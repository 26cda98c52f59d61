//! Query-set loading
//!
//! Query sets group metric declarations into named buckets. The
//! configuration lists group descriptors such as
//!
//! ```yaml
//! query_sets:
//!   - features: [queries/node.yaml, queries/cluster.yaml]
//!     labels: [queries/alerts.yaml]
//! ```
//!
//! and every referenced file holds a YAML sequence of declarations. Buckets
//! are concatenated in descriptor, file and in-file order.

mod declaration;

pub use declaration::{MetricDeclaration, RawDeclaration, ShapeKind};

use crate::{Error, Result};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bucket holding the input-side declarations.
pub const FEATURES_BUCKET: &str = "features";
/// Bucket holding the target-side declarations.
pub const LABELS_BUCKET: &str = "labels";

/// One group descriptor: bucket name to declaration files.
pub type QuerySetGroup = IndexMap<String, Vec<PathBuf>>;

/// Declarations grouped by bucket, in load order.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySets {
    buckets: IndexMap<String, Vec<RawDeclaration>>,
}

impl QuerySets {
    /// Empty query sets with the conventional `features` and `labels` buckets.
    pub fn new() -> Self {
        let mut buckets = IndexMap::new();
        buckets.insert(FEATURES_BUCKET.to_string(), Vec::new());
        buckets.insert(LABELS_BUCKET.to_string(), Vec::new());
        Self { buckets }
    }

    /// Append declarations to a bucket, creating it if needed.
    pub fn extend(&mut self, bucket: &str, declarations: impl IntoIterator<Item = RawDeclaration>) {
        self.buckets
            .entry(bucket.to_string())
            .or_default()
            .extend(declarations);
    }

    /// Declarations of a bucket, or an empty slice if it does not exist.
    pub fn bucket(&self, name: &str) -> &[RawDeclaration] {
        self.buckets.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Bucket names in processing order.
    pub fn bucket_names(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[RawDeclaration])> {
        self.buckets.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Total number of declarations across buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QuerySets {
    fn default() -> Self {
        Self::new()
    }
}

/// Load every declaration file referenced by `groups`.
///
/// Relative paths are resolved against `base_dir` when given. Any unreadable
/// or unparsable file fails the whole load.
pub fn load_query_sets(groups: &[QuerySetGroup], base_dir: Option<&Path>) -> Result<QuerySets> {
    let mut sets = QuerySets::new();

    for group in groups {
        for (bucket, files) in group {
            for file in files {
                let path = resolve_path(file, base_dir);
                let declarations = load_declaration_file(&path)?;
                debug!(
                    bucket = %bucket,
                    path = %path.display(),
                    count = declarations.len(),
                    "Loaded declaration file"
                );
                sets.extend(bucket, declarations);
            }
        }
    }

    info!(
        buckets = sets.buckets.len(),
        declarations = sets.len(),
        "Loaded query sets"
    );
    Ok(sets)
}

/// Parse one YAML declaration file. An empty file yields no declarations.
pub fn load_declaration_file(path: &Path) -> Result<Vec<RawDeclaration>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read declaration file {}: {}", path.display(), e),
        ))
    })?;

    let parsed: Option<Vec<RawDeclaration>> = serde_yaml::from_str(&contents).map_err(|e| {
        Error::Serialization(format!(
            "failed to parse declaration file {}: {}",
            path.display(),
            e
        ))
    })?;

    Ok(parsed.unwrap_or_default())
}

fn resolve_path(path: &Path, base_dir: Option<&Path>) -> PathBuf {
    match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}
