//! Bulk-load manifest documents.
//!
//! A manifest lists the storage-object URLs one bulk-load statement should
//! ingest. Very large transfers are split across several manifests so a
//! single load never references more than a bounded number of objects; each
//! manifest is independently loadable. The builder only assembles documents;
//! uploading them is the orchestrator's job.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One source object inside a manifest.
///
/// Every entry is mandatory: the load fails if any listed object is missing,
/// rather than silently ingesting a partial set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Full object URL, e.g. `s3://bucket/prefix/chunk.csv.gz`
    pub url: String,
    pub mandatory: bool,
}

/// A manifest document, serialized as one JSON object per upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Serialize the manifest to its JSON wire form.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a manifest document from its JSON wire form.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Accumulates uploaded object URLs and partitions them into manifests.
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    entries: Vec<ManifestEntry>,
    max_entries: Option<usize>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of entries per manifest document. Entries beyond the
    /// cap spill into additional manifests, in input order.
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Record one uploaded object URL, preserving input order.
    pub fn push(&mut self, url: impl Into<String>) {
        self.entries.push(ManifestEntry {
            url: url.into(),
            mandatory: true,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Partition the accumulated entries into one or more manifests.
    ///
    /// The first manifest gets the first block of entries, and so on. With
    /// no cap configured (or no entries at all) exactly one manifest is
    /// returned.
    pub fn build(self) -> Vec<Manifest> {
        let max = match self.max_entries {
            Some(max) if max > 0 => max,
            _ => {
                return vec![Manifest {
                    entries: self.entries,
                }]
            }
        };

        if self.entries.is_empty() {
            return vec![Manifest { entries: vec![] }];
        }

        self.entries
            .chunks(max)
            .map(|block| Manifest {
                entries: block.to_vec(),
            })
            .collect()
    }
}
