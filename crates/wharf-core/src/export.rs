//! Chunk export and upload stage.
//!
//! Stages the source result set locally, cuts it at partition boundaries
//! into gzip chunk files, and uploads each chunk as soon as it is produced.
//! Only one chunk payload exists at a time, so memory stays bounded for
//! arbitrarily large results. Local staging artifacts are removed on every
//! exit path according to the request's local-cleanup flags.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use csv::{ByteRecord, QuoteStyle};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info, warn};

use crate::error::{Result, SourceError, WharfError};
use crate::partition::{partition_rows, RowRange};
use crate::request::{DataFormat, TransferRequest};
use crate::source::SourceConnector;
use crate::storage::{ObjectHandle, ObjectStore};

/// One partition after serialization, ready for upload.
#[derive(Debug)]
pub struct StagedChunk {
    /// Position of this chunk in the export order
    pub index: usize,
    /// Local gzip file holding the chunk payload
    pub path: PathBuf,
    /// Rows serialized into this chunk
    pub rows: u64,
}

/// Result of a completed export-and-upload stage.
#[derive(Debug)]
pub struct ExportOutcome {
    /// Uploaded chunk objects, in chunk order
    pub handles: Vec<ObjectHandle>,
    /// Rows transferred; always equals the source's reported row count
    pub rows: u64,
    /// First staged document, captured for field-mapping generation on
    /// JSON-shaped transfers
    pub sample: Option<serde_json::Value>,
}

/// Drives one source extract through partitioning, chunk serialization and
/// upload.
pub struct ChunkExporter<'a> {
    source: &'a dyn SourceConnector,
    storage: &'a dyn ObjectStore,
}

impl<'a> ChunkExporter<'a> {
    pub fn new(source: &'a dyn SourceConnector, storage: &'a dyn ObjectStore) -> Self {
        Self { source, storage }
    }

    /// Extract the request's source, cut it into chunks and upload them in
    /// order, returning the uploaded handles and the transferred row count.
    pub async fn export_and_upload(
        &self,
        request: &TransferRequest,
        stamp: &str,
    ) -> Result<ExportOutcome> {
        std::fs::create_dir_all(&request.staging_dir)?;

        let staging_name = format!(
            "{}-{}.{}",
            request.destination_table.replace('.', "_"),
            stamp,
            request.format.chunk_extension()
        );
        let staging_path = request.staging_dir.join(staging_name);

        let mut guard = StagingGuard::new(request.cleanup_local_on_failure);
        guard.track(staging_path.clone());

        let row_count = self
            .source
            .extract_to_staging(&request.source, &staging_path)
            .await?;
        let ranges = partition_rows(row_count, request.slices)?;
        debug!(
            rows = row_count,
            chunks = ranges.len(),
            "Source staged, cutting chunks"
        );

        let mut reader = ChunkReader::open(&staging_path, request.format)?;
        let capture_sample = request.format == DataFormat::Json;

        let mut handles = Vec::with_capacity(ranges.len());
        let mut sample = None;
        let mut rows_written = 0u64;

        for (index, range) in ranges.iter().enumerate() {
            let chunk = self.write_chunk(
                &mut reader,
                request,
                stamp,
                index,
                range,
                &mut guard,
                if capture_sample { &mut sample } else { &mut None },
            )?;
            rows_written += chunk.rows;

            let key = format!(
                "{}{}_chunk_{}.{}",
                request.key_prefix,
                stamp,
                index,
                request.format.chunk_extension()
            );
            info!(chunk = index, key = %key, rows = chunk.rows, "Uploading chunk");
            let handle = self
                .storage
                .put_file(&request.bucket, &key, &chunk.path)
                .await
                .map_err(|e| WharfError::Upload(e.to_string()))?;

            guard.untrack(&chunk.path);
            std::fs::remove_file(&chunk.path)?;
            handles.push(handle);
        }

        if rows_written != row_count {
            return Err(WharfError::Upload(format!(
                "row count mismatch: source reported {row_count} rows but {rows_written} were staged"
            )));
        }
        if reader.has_more_records()? {
            return Err(WharfError::Upload(format!(
                "row count mismatch: staging artifact holds more than the {row_count} reported rows"
            )));
        }

        guard.finish(request.cleanup_local_on_success);

        Ok(ExportOutcome {
            handles,
            rows: rows_written,
            sample,
        })
    }

    /// Serialize the rows of one partition range into a local gzip chunk
    /// file.
    #[allow(clippy::too_many_arguments)]
    fn write_chunk(
        &self,
        reader: &mut ChunkReader,
        request: &TransferRequest,
        stamp: &str,
        index: usize,
        range: &RowRange,
        guard: &mut StagingGuard,
        sample: &mut Option<serde_json::Value>,
    ) -> Result<StagedChunk> {
        let chunk_path = request.staging_dir.join(format!(
            "{}_chunk_{}.{}",
            stamp,
            index,
            request.format.chunk_extension()
        ));
        guard.track(chunk_path.clone());

        let mut writer = ChunkWriter::create(&chunk_path, request.format)?;
        let mut rows = 0u64;
        for _ in range.start..range.end {
            let record = match reader.next_record()? {
                Some(record) => record,
                None => break,
            };
            if sample.is_none() {
                if let ChunkRecord::Line(line) = &record {
                    *sample = Some(serde_json::from_str(line.trim_end())?);
                }
            }
            writer.write_record(&record)?;
            rows += 1;
        }
        writer.finish()?;

        Ok(StagedChunk {
            index,
            path: chunk_path,
            rows,
        })
    }
}

/// One record pulled off the staging artifact.
enum ChunkRecord {
    Csv(ByteRecord),
    Line(String),
}

/// Sequential, forward-only reader over the staging artifact. Restartable
/// only by reconstruction.
enum ChunkReader {
    Csv(csv::Reader<GzDecoder<BufReader<File>>>),
    Json(BufReader<GzDecoder<BufReader<File>>>),
}

impl ChunkReader {
    fn open(path: &Path, format: DataFormat) -> Result<Self> {
        let decoder = GzDecoder::new(BufReader::new(File::open(path)?));
        Ok(match format {
            DataFormat::Csv => ChunkReader::Csv(
                csv::ReaderBuilder::new()
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(decoder),
            ),
            DataFormat::Json => ChunkReader::Json(BufReader::new(decoder)),
        })
    }

    fn next_record(&mut self) -> Result<Option<ChunkRecord>> {
        match self {
            ChunkReader::Csv(reader) => {
                let mut record = ByteRecord::new();
                if reader.read_byte_record(&mut record).map_err(csv_error)? {
                    Ok(Some(ChunkRecord::Csv(record)))
                } else {
                    Ok(None)
                }
            }
            ChunkReader::Json(reader) => {
                let mut line = String::new();
                if reader.read_line(&mut line)? == 0 {
                    Ok(None)
                } else {
                    Ok(Some(ChunkRecord::Line(line)))
                }
            }
        }
    }

    fn has_more_records(&mut self) -> Result<bool> {
        Ok(self.next_record()?.is_some())
    }
}

/// Writer for one chunk file; mirrors the staging artifact's format.
enum ChunkWriter {
    Csv(csv::Writer<GzEncoder<File>>),
    Json(GzEncoder<File>),
}

impl ChunkWriter {
    fn create(path: &Path, format: DataFormat) -> Result<Self> {
        let encoder = GzEncoder::new(File::create(path)?, Compression::default());
        Ok(match format {
            DataFormat::Csv => ChunkWriter::Csv(
                csv::WriterBuilder::new()
                    .quote_style(QuoteStyle::Always)
                    .from_writer(encoder),
            ),
            DataFormat::Json => ChunkWriter::Json(encoder),
        })
    }

    fn write_record(&mut self, record: &ChunkRecord) -> Result<()> {
        match (self, record) {
            (ChunkWriter::Csv(writer), ChunkRecord::Csv(record)) => {
                writer.write_byte_record(record).map_err(csv_error)?;
            }
            (ChunkWriter::Json(encoder), ChunkRecord::Line(line)) => {
                encoder.write_all(line.as_bytes())?;
                if !line.ends_with('\n') {
                    encoder.write_all(b"\n")?;
                }
            }
            _ => {
                return Err(WharfError::Upload(
                    "chunk record format diverged from the staging format".to_string(),
                ))
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        match self {
            ChunkWriter::Csv(writer) => {
                let encoder = writer
                    .into_inner()
                    .map_err(|e| WharfError::Upload(e.to_string()))?;
                encoder.finish()?;
            }
            ChunkWriter::Json(encoder) => {
                encoder.finish()?;
            }
        }
        Ok(())
    }
}

fn csv_error(error: csv::Error) -> WharfError {
    WharfError::Export(SourceError::Malformed {
        format: "csv".to_string(),
        message: error.to_string(),
    })
}

/// Removes tracked staging files on every exit path.
///
/// While armed, dropping the guard deletes the tracked files when
/// failure-cleanup is requested; `finish` handles the success path and
/// disarms. Deletion problems are logged, never raised.
struct StagingGuard {
    paths: Vec<PathBuf>,
    cleanup_on_failure: bool,
    armed: bool,
}

impl StagingGuard {
    fn new(cleanup_on_failure: bool) -> Self {
        Self {
            paths: Vec::new(),
            cleanup_on_failure,
            armed: true,
        }
    }

    fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    fn untrack(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    fn finish(mut self, cleanup_on_success: bool) {
        if cleanup_on_success {
            self.remove_all();
        }
        self.armed = false;
    }

    fn remove_all(&mut self) {
        for path in self.paths.drain(..) {
            if path.exists() {
                if let Err(error) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %error, "Failed to remove staging file");
                }
            }
        }
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if self.armed && self.cleanup_on_failure {
            self.remove_all();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::request::{SourceSpec, TransferRequest};
    use crate::source::JsonDocumentSource;
    use async_trait::async_trait;
    use serde_json::json;
    use std::io::Read;
    use std::sync::Mutex;

    /// In-memory object store recording uploads in order.
    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<Vec<(String, Vec<u8>)>>,
        fail_on_upload: Option<usize>,
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn put_bytes(
            &self,
            bucket: &str,
            key: &str,
            data: Vec<u8>,
        ) -> std::result::Result<ObjectHandle, crate::error::StorageError> {
            let mut objects = self.objects.lock().unwrap();
            if self.fail_on_upload == Some(objects.len()) {
                return Err(crate::error::StorageError::Put {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message: "injected upload failure".to_string(),
                });
            }
            objects.push((key.to_string(), data));
            Ok(ObjectHandle::new(bucket, key))
        }

        async fn put_file(
            &self,
            bucket: &str,
            key: &str,
            path: &Path,
        ) -> std::result::Result<ObjectHandle, crate::error::StorageError> {
            let data = std::fs::read(path)?;
            self.put_bytes(bucket, key, data).await
        }

        async fn get(
            &self,
            _bucket: &str,
            key: &str,
        ) -> std::result::Result<Vec<u8>, crate::error::StorageError> {
            let objects = self.objects.lock().unwrap();
            objects
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, data)| data.clone())
                .ok_or_else(|| crate::error::StorageError::Get {
                    bucket: "bucket".to_string(),
                    key: key.to_string(),
                    message: "not found".to_string(),
                })
        }

        async fn delete(
            &self,
            _bucket: &str,
            keys: &[String],
        ) -> std::result::Result<(), crate::error::StorageError> {
            let mut objects = self.objects.lock().unwrap();
            objects.retain(|(k, _)| !keys.contains(k));
            Ok(())
        }

        async fn list(
            &self,
            _bucket: &str,
            prefix: &str,
        ) -> std::result::Result<Vec<String>, crate::error::StorageError> {
            let objects = self.objects.lock().unwrap();
            Ok(objects
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, _)| k.clone())
                .collect())
        }
    }

    /// Source connector that misreports its row count.
    struct LyingSource {
        inner: JsonDocumentSource,
        reported_rows: u64,
    }

    #[async_trait]
    impl SourceConnector for LyingSource {
        async fn extract_to_staging(
            &self,
            source: &SourceSpec,
            staging_path: &Path,
        ) -> std::result::Result<u64, SourceError> {
            self.inner.extract_to_staging(source, staging_path).await?;
            Ok(self.reported_rows)
        }
    }

    fn docs(n: usize) -> Vec<serde_json::Value> {
        (1..=n as i64).map(|a| json!({"a": a})).collect()
    }

    fn request(dir: &Path, slices: usize) -> TransferRequest {
        TransferRequest::builder()
            .destination_table("foo_table")
            .table("src_table")
            .bucket("staging-bucket")
            .key_prefix("tmp/tests")
            .slices(slices)
            .format(DataFormat::Json)
            .staging_dir(dir)
            .build()
            .unwrap()
    }

    fn decode_values(payload: &[u8]) -> Vec<i64> {
        let mut text = String::new();
        GzDecoder::new(payload).read_to_string(&mut text).unwrap();
        text.lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["a"]
                .as_i64()
                .unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_chunks_cover_all_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonDocumentSource::new(docs(16));
        let storage = MemoryStore::default();
        let exporter = ChunkExporter::new(&source, &storage);

        let outcome = exporter
            .export_and_upload(&request(dir.path(), 5), "2024-01-05_10-00-00")
            .await
            .unwrap();

        assert_eq!(outcome.rows, 16);
        assert_eq!(outcome.handles.len(), 5);
        assert_eq!(outcome.sample, Some(json!({"a": 1})));
        assert_eq!(
            outcome.handles[0].key,
            "tmp/tests/2024-01-05_10-00-00_chunk_0.json.gz"
        );

        // Reassembling the uploaded chunks yields all rows, in order.
        let objects = storage.objects.lock().unwrap();
        let all: Vec<i64> = objects
            .iter()
            .flat_map(|(_, payload)| decode_values(payload))
            .collect();
        assert_eq!(all, (1..=16).collect::<Vec<i64>>());

        // All local staging artifacts are gone after success.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_small_result_yields_single_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonDocumentSource::new(docs(5));
        let storage = MemoryStore::default();
        let exporter = ChunkExporter::new(&source, &storage);

        let outcome = exporter
            .export_and_upload(&request(dir.path(), 30), "stamp")
            .await
            .unwrap();
        assert_eq!(outcome.handles.len(), 1);
        assert_eq!(outcome.rows, 5);
    }

    #[tokio::test]
    async fn test_staging_retained_when_cleanup_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonDocumentSource::new(docs(4));
        let storage = MemoryStore::default();
        let exporter = ChunkExporter::new(&source, &storage);

        let mut req = request(dir.path(), 2);
        req.cleanup_local_on_success = false;
        exporter.export_and_upload(&req, "stamp").await.unwrap();

        // The staging extract survives; chunk files are still removed after
        // their uploads.
        let remaining: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(remaining, vec!["foo_table-stamp.json.gz".to_string()]);
    }

    #[tokio::test]
    async fn test_upload_failure_aborts_and_cleans_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonDocumentSource::new(docs(16));
        let storage = MemoryStore {
            fail_on_upload: Some(2),
            ..MemoryStore::default()
        };
        let exporter = ChunkExporter::new(&source, &storage);

        let err = exporter
            .export_and_upload(&request(dir.path(), 4), "stamp")
            .await
            .unwrap_err();
        assert!(matches!(err, WharfError::Upload(_)));

        // Two chunks made it before the failure; locals are cleaned up.
        assert_eq!(storage.objects.lock().unwrap().len(), 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_row_count_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let source = LyingSource {
            inner: JsonDocumentSource::new(docs(6)),
            reported_rows: 9,
        };
        let storage = MemoryStore::default();
        let exporter = ChunkExporter::new(&source, &storage);

        let err = exporter
            .export_and_upload(&request(dir.path(), 3), "stamp")
            .await
            .unwrap_err();
        match err {
            WharfError::Upload(message) => assert!(message.contains("row count mismatch")),
            other => panic!("expected upload error, got {other:?}"),
        }
    }
}
