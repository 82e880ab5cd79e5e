//! Field-mapping document generation for semi-structured loads.
//!
//! The warehouse maps JSON fields to destination columns through a
//! "jsonpaths" document: an ordered list of field-access paths derived from
//! a sample document. Paths walk object keys; arrays are referenced at a
//! single configured index and never descended into, because a columnar
//! destination can only bind one array element per column.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// The field-mapping document consumed by the warehouse loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonPaths {
    pub jsonpaths: Vec<String>,
}

impl JsonPaths {
    /// Serialize to the JSON wire form uploaded next to the manifest.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Derive the sorted, deduplicated set of field-access paths for `sample`.
///
/// Every scalar reached through a chain of object keys contributes a path
/// like `$['a']['b']`. Every array contributes a single path ending in
/// `[array_index]` (default 0) and is not descended into. Identical input
/// always yields identical output.
pub fn generate_jsonpaths(sample: &Value, array_index: Option<usize>) -> JsonPaths {
    let mut paths = BTreeSet::new();
    walk(&mut paths, sample, "$", array_index.unwrap_or(0));
    JsonPaths {
        jsonpaths: paths.into_iter().collect(),
    }
}

fn walk(paths: &mut BTreeSet<String>, value: &Value, parent: &str, array_index: usize) {
    match value {
        Value::Object(fields) => {
            for (key, child) in fields {
                let path = format!("{parent}['{key}']");
                match child {
                    Value::Object(_) | Value::Array(_) => {
                        walk(paths, child, &path, array_index);
                    }
                    _ => {
                        paths.insert(path);
                    }
                }
            }
        }
        Value::Array(_) => {
            paths.insert(format!("{parent}[{array_index}]"));
        }
        _ => {}
    }
}
