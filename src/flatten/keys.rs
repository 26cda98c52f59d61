//! Column key synthesis

use crate::client::Labels;
use std::collections::HashMap;

/// Label carrying the node identity in node-shaped results.
pub const NODE_LABEL: &str = "node";
/// Label whose value is truncated at the first `:` (host:port).
pub const INSTANCE_LABEL: &str = "instance";
/// Attribute suffix used when a series has no attribute labels.
pub const DEFAULT_ATTRIBUTE_KEY: &str = "default";

/// Stable synthetic ids for raw node names.
///
/// Ids are assigned in first-seen order (`node1`, `node2`, ...) and live as
/// long as the map, so a node keeps its id across cycles.
#[derive(Debug, Clone, Default)]
pub struct NodeIdentityMap {
    ids: HashMap<String, String>,
}

impl NodeIdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synthetic id for `raw`, assigning the next one on first sight.
    pub fn resolve(&mut self, raw: &str) -> String {
        if let Some(id) = self.ids.get(raw) {
            return id.clone();
        }
        let id = format!("node{}", self.ids.len() + 1);
        self.ids.insert(raw.to_string(), id.clone());
        id
    }

    /// Id already assigned to `raw`, without assigning one.
    pub fn get(&self, raw: &str) -> Option<&str> {
        self.ids.get(raw).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Which labels take part in an attribute key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeScope {
    /// Every label except `node`
    WithoutNode,
    /// Every label; `instance` loses its `:port` suffix
    AllLabels,
}

/// Join a series' label values into a column-safe suffix.
///
/// Labels are taken in the order the backend returned them. Labels with an
/// empty name are ignored, `-` and `.` become `_`, and the values are joined
/// with `_`. With no qualifying labels the suffix is `default`.
pub fn attribute_key(labels: &Labels, scope: AttributeScope) -> String {
    let parts: Vec<String> = labels
        .iter()
        .filter(|(name, _)| !name.is_empty())
        .filter(|(name, _)| !(scope == AttributeScope::WithoutNode && name.as_str() == NODE_LABEL))
        .map(|(name, value)| {
            let value = match scope {
                AttributeScope::AllLabels if name == INSTANCE_LABEL => {
                    value.split(':').next().unwrap_or_default()
                }
                _ => value.as_str(),
            };
            sanitize(value)
        })
        .collect();

    if parts.is_empty() {
        DEFAULT_ATTRIBUTE_KEY.to_string()
    } else {
        parts.join("_")
    }
}

fn sanitize(value: &str) -> String {
    value.replace(['-', '.'], "_")
}
