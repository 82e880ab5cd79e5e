//! Transfer request description and validation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WharfError};
use crate::jsonpaths::JsonPaths;

/// Default slice count, sized for a typical cluster's parallel load width.
pub const DEFAULT_SLICES: usize = 32;

/// What to read from the relational source: a whole table, or the result of
/// a read query. Exactly one must be given per transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceSpec {
    /// Export every row of the named table
    Table(String),
    /// Export the result set of a SELECT statement
    Query(String),
}

impl SourceSpec {
    /// Render the source as the relation expression an extract statement
    /// embeds; queries are parenthesized.
    pub fn as_relation(&self) -> String {
        match self {
            SourceSpec::Table(name) => name.clone(),
            SourceSpec::Query(query) => {
                let trimmed = query.trim();
                if trimmed.starts_with('(') && trimmed.ends_with(')') {
                    trimmed.to_string()
                } else {
                    format!("({trimmed})")
                }
            }
        }
    }
}

/// Serialization shape of the staged rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// Quoted CSV, one record per row
    #[default]
    Csv,
    /// Newline-delimited JSON documents, loaded through a field-mapping
    /// document
    Json,
}

impl DataFormat {
    /// File extension used for staged chunk objects of this shape.
    pub fn chunk_extension(&self) -> &'static str {
        match self {
            DataFormat::Csv => "csv.gz",
            DataFormat::Json => "json.gz",
        }
    }
}

/// Immutable description of one bulk transfer.
///
/// Constructed through [`TransferRequest::builder`], consumed once by the
/// orchestrator, never persisted.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Destination table in the warehouse; must already exist
    pub destination_table: String,
    /// What to export from the relational source
    pub source: SourceSpec,
    /// Object-storage bucket receiving staged chunks
    pub bucket: String,
    /// Key prefix under the bucket; normalized to no leading and one
    /// trailing slash
    pub key_prefix: String,
    /// Number of chunks to stage for parallel loading
    pub slices: usize,
    /// Serialization shape of the staged rows
    pub format: DataFormat,
    /// Caller-supplied field mapping; generated from a sample row when
    /// absent and the format is JSON
    pub jsonpaths: Option<JsonPaths>,
    /// Array index used when generating the field mapping
    pub array_index: Option<usize>,
    /// Directory for the staging extract and chunk-local files
    pub staging_dir: PathBuf,
    /// Delete every staged storage object if the transfer fails
    pub cleanup_storage_on_failure: bool,
    /// Delete local staging artifacts after a successful transfer
    pub cleanup_local_on_success: bool,
    /// Delete local staging artifacts when the transfer fails
    pub cleanup_local_on_failure: bool,
}

impl TransferRequest {
    pub fn builder() -> TransferRequestBuilder {
        TransferRequestBuilder::default()
    }
}

/// Builder for [`TransferRequest`]; `build` validates the combination.
#[derive(Debug)]
pub struct TransferRequestBuilder {
    destination_table: Option<String>,
    table: Option<String>,
    query: Option<String>,
    bucket: Option<String>,
    key_prefix: String,
    slices: usize,
    format: DataFormat,
    jsonpaths: Option<JsonPaths>,
    array_index: Option<usize>,
    staging_dir: Option<PathBuf>,
    cleanup_storage_on_failure: bool,
    cleanup_local_on_success: bool,
    cleanup_local_on_failure: bool,
}

impl Default for TransferRequestBuilder {
    fn default() -> Self {
        Self {
            destination_table: None,
            table: None,
            query: None,
            bucket: None,
            key_prefix: String::new(),
            slices: DEFAULT_SLICES,
            format: DataFormat::default(),
            jsonpaths: None,
            array_index: None,
            staging_dir: None,
            cleanup_storage_on_failure: true,
            cleanup_local_on_success: true,
            cleanup_local_on_failure: true,
        }
    }
}

impl TransferRequestBuilder {
    pub fn destination_table(mut self, table: impl Into<String>) -> Self {
        self.destination_table = Some(table.into());
        self
    }

    /// Export a whole source table. Mutually exclusive with [`Self::query`].
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Export the result of a read query. Mutually exclusive with
    /// [`Self::table`].
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    pub fn slices(mut self, slices: usize) -> Self {
        self.slices = slices;
        self
    }

    pub fn format(mut self, format: DataFormat) -> Self {
        self.format = format;
        self
    }

    pub fn jsonpaths(mut self, jsonpaths: JsonPaths) -> Self {
        self.jsonpaths = Some(jsonpaths);
        self
    }

    pub fn array_index(mut self, array_index: usize) -> Self {
        self.array_index = Some(array_index);
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn cleanup_storage_on_failure(mut self, cleanup: bool) -> Self {
        self.cleanup_storage_on_failure = cleanup;
        self
    }

    pub fn cleanup_local_on_success(mut self, cleanup: bool) -> Self {
        self.cleanup_local_on_success = cleanup;
        self
    }

    pub fn cleanup_local_on_failure(mut self, cleanup: bool) -> Self {
        self.cleanup_local_on_failure = cleanup;
        self
    }

    /// Validate the accumulated fields and produce the immutable request.
    pub fn build(self) -> Result<TransferRequest> {
        let destination_table = self
            .destination_table
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                WharfError::InvalidRequest("a destination table is required".to_string())
            })?;

        let bucket = self.bucket.filter(|b| !b.trim().is_empty()).ok_or_else(|| {
            WharfError::InvalidRequest("an object-storage bucket is required".to_string())
        })?;

        let source = match (self.table, self.query) {
            (Some(table), None) => SourceSpec::Table(table),
            (None, Some(query)) => SourceSpec::Query(query),
            (Some(_), Some(_)) => {
                return Err(WharfError::InvalidRequest(
                    "a source table and a source query are mutually exclusive".to_string(),
                ))
            }
            (None, None) => {
                return Err(WharfError::InvalidRequest(
                    "either a source table or a source query is required".to_string(),
                ))
            }
        };

        if self.slices < 1 {
            return Err(WharfError::InvalidRequest(
                "slice count must be at least 1".to_string(),
            ));
        }

        let staging_dir = self
            .staging_dir
            .unwrap_or_else(|| std::env::temp_dir().join("wharf"));

        Ok(TransferRequest {
            destination_table,
            source,
            bucket,
            key_prefix: normalize_key_prefix(&self.key_prefix),
            slices: self.slices,
            format: self.format,
            jsonpaths: self.jsonpaths,
            array_index: self.array_index,
            staging_dir,
            cleanup_storage_on_failure: self.cleanup_storage_on_failure,
            cleanup_local_on_success: self.cleanup_local_on_success,
            cleanup_local_on_failure: self.cleanup_local_on_failure,
        })
    }
}

/// Strip any leading slash and guarantee a single trailing slash, so chunk
/// names can be appended directly. An empty prefix stays empty.
fn normalize_key_prefix(prefix: &str) -> String {
    let stripped = prefix.trim_start_matches('/');
    if stripped.is_empty() {
        return String::new();
    }
    if stripped.ends_with('/') {
        stripped.to_string()
    } else {
        format!("{stripped}/")
    }
}
