//! Metric declarations and shape kinds
//!
//! A declaration names a query and the shape its result is flattened into.
//! Declarations are loaded permissively as [`RawDeclaration`] and only
//! validated when a cycle processes them.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PER_NODE_SUFFIX: &str = "per_node";
const PER_NODE_PER_ATTRIBUTE_SUFFIX: &str = "per_node_per_attribute";

/// Reduction strategy applied to a declaration's query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    /// One value keyed by the declaration name
    Scalar,
    /// Like `Scalar`; the raw value is kept as-is
    Boolean,
    /// One column per node: `{node_id}_{name}`
    PerNode,
    /// One column per node and label combination: `{node_id}_{attrs}`
    PerNodePerAttribute,
    /// One column per label combination: `{name}_{attrs}`
    ScalarPerAttribute,
    /// Per-node status recoded to `green` or the declaration's label
    BooleanPerNode,
}

impl ShapeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeKind::Scalar => "scalar",
            ShapeKind::Boolean => "boolean",
            ShapeKind::PerNode => "per_node",
            ShapeKind::PerNodePerAttribute => "per_node_per_attribute",
            ShapeKind::ScalarPerAttribute => "scalar_per_attribute",
            ShapeKind::BooleanPerNode => "boolean_per_node",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShapeKind {
    type Err = Error;

    /// Exact names win; otherwise the `per_node_per_attribute` and
    /// `per_node` suffixes select their family, so `gauge_per_node`
    /// is a `PerNode` shape.
    fn from_str(value: &str) -> Result<Self> {
        match value {
            "scalar" => Ok(ShapeKind::Scalar),
            "boolean" => Ok(ShapeKind::Boolean),
            "scalar_per_attribute" => Ok(ShapeKind::ScalarPerAttribute),
            "boolean_per_node" => Ok(ShapeKind::BooleanPerNode),
            s if s.ends_with(PER_NODE_PER_ATTRIBUTE_SUFFIX) => Ok(ShapeKind::PerNodePerAttribute),
            s if s.ends_with(PER_NODE_SUFFIX) => Ok(ShapeKind::PerNode),
            other => Err(Error::UnsupportedShape(other.to_string())),
        }
    }
}

/// Declaration as read from a query-set file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDeclaration {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub expr: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl RawDeclaration {
    /// Convenience constructor for a complete declaration.
    pub fn new(name: impl Into<String>, kind: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            kind: Some(kind.into()),
            expr: Some(expr.into()),
            label: None,
        }
    }

    /// Set the fault label used by `boolean_per_node`.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Name for log lines, even when the declaration is incomplete.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    /// Check required fields and resolve the shape kind.
    pub fn validate(&self) -> Result<MetricDeclaration> {
        let name = self.name.as_ref().ok_or_else(|| {
            Error::InvalidDeclaration(format!("missing the 'name' key in {:?}", self))
        })?;
        let kind = self.kind.as_ref().ok_or_else(|| {
            Error::InvalidDeclaration(format!("entry '{}' missing the 'type' key", name))
        })?;
        let expr = self.expr.as_ref().ok_or_else(|| {
            Error::InvalidDeclaration(format!("entry '{}' missing the 'expr' key", name))
        })?;
        let shape = kind.parse::<ShapeKind>()?;

        Ok(MetricDeclaration {
            name: name.clone(),
            shape,
            expr: expr.clone(),
            label: self.label.clone(),
        })
    }
}

/// A validated declaration ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDeclaration {
    pub name: String,
    pub shape: ShapeKind,
    pub expr: String,
    pub label: Option<String>,
}
