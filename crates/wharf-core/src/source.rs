//! Relational source connectors.
//!
//! A connector materializes the requested result set to a local staging
//! artifact and reports the exported row count. Staging artifacts are
//! gzip-compressed; CSV extracts quote every field so record boundaries
//! survive embedded delimiters and newlines, and JSON extracts hold one
//! document per line.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::StreamExt;
use sqlx::postgres::PgPoolCopyExt;
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use crate::error::SourceError;
use crate::request::SourceSpec;

/// Materializes a query or table result to a local staging artifact.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Extract `source` to `staging_path`, returning the exported row count.
    async fn extract_to_staging(
        &self,
        source: &SourceSpec,
        staging_path: &Path,
    ) -> Result<u64, SourceError>;
}

/// PostgreSQL source connector, streaming `COPY ... TO STDOUT` output into
/// the staging file.
#[derive(Clone)]
pub struct PostgresSource {
    pool: PgPool,
}

impl PostgresSource {
    /// Connect to the source database.
    pub async fn connect(database_url: &str) -> Result<Self, SourceError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceConnector for PostgresSource {
    #[instrument(skip(self))]
    async fn extract_to_staging(
        &self,
        source: &SourceSpec,
        staging_path: &Path,
    ) -> Result<u64, SourceError> {
        let statement = format!(
            "COPY {} TO STDOUT (FORMAT csv, FORCE_QUOTE *)",
            source.as_relation()
        );
        debug!(statement = %statement, "Extracting source to staging");

        let mut stream = self.pool.copy_out_raw(&statement).await?;
        let mut encoder = GzEncoder::new(File::create(staging_path)?, Compression::default());
        let mut bytes_written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            encoder.write_all(&chunk)?;
            bytes_written += chunk.len() as u64;
        }
        encoder.finish()?;

        let row_count = count_csv_records(staging_path)?;
        info!(
            rows = row_count,
            bytes = bytes_written,
            path = %staging_path.display(),
            "Source extract staged"
        );
        Ok(row_count)
    }
}

/// In-memory JSON source: writes one document per line to the staging
/// artifact. Intended for callers that already hold the documents to load.
pub struct JsonDocumentSource {
    documents: Vec<serde_json::Value>,
}

impl JsonDocumentSource {
    pub fn new(documents: Vec<serde_json::Value>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl SourceConnector for JsonDocumentSource {
    #[instrument(skip(self))]
    async fn extract_to_staging(
        &self,
        _source: &SourceSpec,
        staging_path: &Path,
    ) -> Result<u64, SourceError> {
        let mut encoder = GzEncoder::new(File::create(staging_path)?, Compression::default());
        for document in &self.documents {
            let line = serde_json::to_vec(document).map_err(|e| SourceError::Malformed {
                format: "json".to_string(),
                message: e.to_string(),
            })?;
            encoder.write_all(&line)?;
            encoder.write_all(b"\n")?;
        }
        encoder.finish()?;

        info!(
            rows = self.documents.len(),
            path = %staging_path.display(),
            "JSON documents staged"
        );
        Ok(self.documents.len() as u64)
    }
}

/// Count the records in a gzip-compressed CSV staging artifact.
fn count_csv_records(path: &Path) -> Result<u64, SourceError> {
    let reader = GzDecoder::new(BufReader::new(File::open(path)?));
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut count = 0u64;
    for record in csv_reader.byte_records() {
        record.map_err(|e| SourceError::Malformed {
            format: "csv".to_string(),
            message: e.to_string(),
        })?;
        count += 1;
    }
    Ok(count)
}
