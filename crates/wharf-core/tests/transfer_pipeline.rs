//! End-to-end pipeline tests over in-memory collaborators.
//!
//! These drive the orchestrator the way the production binary does, with
//! the source, object store and warehouse replaced by mocks that record
//! every interaction.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;

use wharf_core::credentials::AwsCredentials;
use wharf_core::error::{SourceError, StorageError, WarehouseError, WharfError};
use wharf_core::manifest::Manifest;
use wharf_core::request::{DataFormat, SourceSpec, TransferRequest};
use wharf_core::source::{JsonDocumentSource, SourceConnector};
use wharf_core::storage::{ObjectHandle, ObjectStore};
use wharf_core::transfer::TransferOrchestrator;
use wharf_core::warehouse::Warehouse;

/// Source connector staging `rows` quoted CSV records.
struct CsvFixtureSource {
    rows: usize,
    called: AtomicBool,
}

impl CsvFixtureSource {
    fn new(rows: usize) -> Self {
        Self {
            rows,
            called: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SourceConnector for CsvFixtureSource {
    async fn extract_to_staging(
        &self,
        _source: &SourceSpec,
        staging_path: &Path,
    ) -> Result<u64, SourceError> {
        self.called.store(true, Ordering::SeqCst);
        let mut encoder = GzEncoder::new(File::create(staging_path)?, Compression::default());
        for i in 0..self.rows {
            writeln!(encoder, "\"{i}\",\"value_{i}\"")?;
        }
        encoder.finish()?;
        Ok(self.rows as u64)
    }
}

/// Object store recording puts and deletes in order.
#[derive(Default)]
struct MemoryStore {
    objects: Mutex<Vec<(String, Vec<u8>)>>,
    deletes: Mutex<Vec<Vec<String>>>,
}

impl MemoryStore {
    fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn payload(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, data)| data.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
    ) -> Result<ObjectHandle, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .push((key.to_string(), data));
        Ok(ObjectHandle::new(bucket, key))
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<ObjectHandle, StorageError> {
        let data = std::fs::read(path)?;
        self.put_bytes(bucket, key, data).await
    }

    async fn get(&self, _bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.payload(key).ok_or_else(|| StorageError::Get {
            bucket: "staging-bucket".to_string(),
            key: key.to_string(),
            message: "not found".to_string(),
        })
    }

    async fn delete(&self, _bucket: &str, keys: &[String]) -> Result<(), StorageError> {
        self.deletes.lock().unwrap().push(keys.to_vec());
        self.objects
            .lock()
            .unwrap()
            .retain(|(k, _)| !keys.contains(k));
        Ok(())
    }

    async fn list(&self, _bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

/// Warehouse recording executed statements; can fail the n-th statement.
struct MockWarehouse {
    statements: Mutex<Vec<String>>,
    destination_exists: bool,
    fail_on_statement: Option<usize>,
}

impl MockWarehouse {
    fn new() -> Self {
        Self {
            statements: Mutex::new(Vec::new()),
            destination_exists: true,
            fail_on_statement: None,
        }
    }

    fn missing_destination() -> Self {
        Self {
            destination_exists: false,
            ..Self::new()
        }
    }

    fn failing_on(statement_index: usize) -> Self {
        Self {
            fail_on_statement: Some(statement_index),
            ..Self::new()
        }
    }

    fn executed(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn execute(&self, statement: &str) -> Result<u64, WarehouseError> {
        let mut statements = self.statements.lock().unwrap();
        if self.fail_on_statement == Some(statements.len()) {
            return Err(WarehouseError::Statement(
                "injected load failure".to_string(),
            ));
        }
        statements.push(statement.to_string());
        Ok(0)
    }

    async fn table_exists(&self, _table: &str) -> Result<bool, WarehouseError> {
        Ok(self.destination_exists)
    }
}

fn key_credentials() -> AwsCredentials {
    AwsCredentials::KeySecret {
        access_key_id: "access_key".to_string(),
        secret_access_key: "secret_key".to_string(),
        session_token: None,
    }
}

fn csv_request(staging_dir: &Path, slices: usize) -> TransferRequest {
    TransferRequest::builder()
        .destination_table("analytics.events")
        .table("public.events")
        .bucket("staging-bucket")
        .key_prefix("backfills/events")
        .slices(slices)
        .staging_dir(staging_dir)
        .build()
        .unwrap()
}

fn orchestrator(
    source: Arc<dyn SourceConnector>,
    storage: Arc<MemoryStore>,
    warehouse: Arc<MockWarehouse>,
) -> TransferOrchestrator {
    TransferOrchestrator::new(source, storage, warehouse, key_credentials())
}

#[tokio::test]
async fn test_csv_transfer_success() {
    let staging = tempfile::tempdir().unwrap();
    let storage = Arc::new(MemoryStore::default());
    let warehouse = Arc::new(MockWarehouse::new());
    let orchestrator = orchestrator(
        Arc::new(CsvFixtureSource::new(9)),
        storage.clone(),
        warehouse.clone(),
    );

    let outcome = orchestrator
        .transfer(csv_request(staging.path(), 3))
        .await
        .unwrap();

    assert_eq!(outcome.rows_transferred, 9);
    assert_eq!(outcome.chunks, 3);
    assert_eq!(outcome.manifests, 1);
    // 3 chunks plus the manifest stay in storage after success.
    assert_eq!(outcome.objects.len(), 4);
    assert_eq!(storage.keys().len(), 4);
    assert!(storage.deletes.lock().unwrap().is_empty());

    // The manifest lists the chunk objects in upload order, all mandatory.
    let manifest_key = storage
        .keys()
        .into_iter()
        .find(|k| k.ends_with(".manifest"))
        .unwrap();
    let manifest = Manifest::from_json(&storage.payload(&manifest_key).unwrap()).unwrap();
    assert_eq!(manifest.entries.len(), 3);
    for (i, entry) in manifest.entries.iter().enumerate() {
        assert!(entry.url.starts_with("s3://staging-bucket/backfills/events/"));
        assert!(entry.url.ends_with(&format!("_chunk_{i}.csv.gz")));
        assert!(entry.mandatory);
    }

    // One load statement, referencing the manifest with the CSV clauses.
    let statements = warehouse.executed();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].starts_with("COPY analytics.events\nFROM 's3://staging-bucket/"));
    assert!(statements[0]
        .contains("CREDENTIALS 'aws_access_key_id=access_key;aws_secret_access_key=secret_key'"));
    assert!(statements[0].ends_with("MANIFEST\nCSV\nGZIP"));
}

#[tokio::test]
async fn test_json_transfer_uploads_field_mapping() {
    let staging = tempfile::tempdir().unwrap();
    let storage = Arc::new(MemoryStore::default());
    let warehouse = Arc::new(MockWarehouse::new());
    let docs = vec![
        json!({"one": 1, "two": {"three": 3}}),
        json!({"one": 4, "two": {"three": 5}}),
    ];
    let orchestrator = orchestrator(
        Arc::new(JsonDocumentSource::new(docs)),
        storage.clone(),
        warehouse.clone(),
    );

    let mut request = csv_request(staging.path(), 4);
    request.format = DataFormat::Json;
    let outcome = orchestrator.transfer(request).await.unwrap();

    // 2 docs collapse into a single chunk, plus manifest and jsonpaths.
    assert_eq!(outcome.rows_transferred, 2);
    assert_eq!(outcome.chunks, 1);
    assert_eq!(outcome.objects.len(), 3);

    let jsonpaths_key = storage
        .keys()
        .into_iter()
        .find(|k| k.ends_with(".jsonpaths"))
        .unwrap();
    assert_eq!(
        String::from_utf8(storage.payload(&jsonpaths_key).unwrap()).unwrap(),
        r#"{"jsonpaths":["$['one']","$['two']['three']"]}"#
    );

    let statements = warehouse.executed();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].contains(&format!("JSON 's3://staging-bucket/{jsonpaths_key}'")));
    assert!(statements[0].ends_with("MANIFEST\nGZIP\nTIMEFORMAT 'auto'"));
}

#[tokio::test]
async fn test_load_failure_rolls_back_every_staged_object() {
    let staging = tempfile::tempdir().unwrap();
    let storage = Arc::new(MemoryStore::default());
    let warehouse = Arc::new(MockWarehouse::failing_on(0));
    let orchestrator = orchestrator(
        Arc::new(CsvFixtureSource::new(10)),
        storage.clone(),
        warehouse.clone(),
    );

    let staged_keys_before_failure = 6; // 5 chunks + 1 manifest
    let err = orchestrator
        .transfer(csv_request(staging.path(), 5))
        .await
        .unwrap_err();

    // The original load failure propagates, not a cleanup error.
    match err {
        WharfError::Load(message) => assert!(message.contains("injected load failure")),
        other => panic!("expected load failure, got {other:?}"),
    }

    // Every staged object was passed to delete, in one batch.
    let deletes = storage.deletes.lock().unwrap();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].len(), staged_keys_before_failure);
    assert_eq!(
        deletes[0]
            .iter()
            .filter(|k| k.contains("_chunk_"))
            .count(),
        5
    );
    assert_eq!(deletes[0].iter().filter(|k| k.ends_with(".manifest")).count(), 1);
    assert!(storage.keys().is_empty());
}

#[tokio::test]
async fn test_rollback_disabled_retains_staged_objects() {
    let staging = tempfile::tempdir().unwrap();
    let storage = Arc::new(MemoryStore::default());
    let warehouse = Arc::new(MockWarehouse::failing_on(0));
    let orchestrator = orchestrator(
        Arc::new(CsvFixtureSource::new(4)),
        storage.clone(),
        warehouse.clone(),
    );

    let mut request = csv_request(staging.path(), 2);
    request.cleanup_storage_on_failure = false;
    let err = orchestrator.transfer(request).await.unwrap_err();

    assert!(matches!(err, WharfError::Load(_)));
    assert!(storage.deletes.lock().unwrap().is_empty());
    assert_eq!(storage.keys().len(), 3); // 2 chunks + 1 manifest
}

#[tokio::test]
async fn test_missing_destination_aborts_before_export() {
    let staging = tempfile::tempdir().unwrap();
    let storage = Arc::new(MemoryStore::default());
    let warehouse = Arc::new(MockWarehouse::missing_destination());
    let source = Arc::new(CsvFixtureSource::new(4));
    let orchestrator = orchestrator(source.clone(), storage.clone(), warehouse.clone());

    let err = orchestrator
        .transfer(csv_request(staging.path(), 2))
        .await
        .unwrap_err();

    match err {
        WharfError::DestinationMissing(table) => assert_eq!(table, "analytics.events"),
        other => panic!("expected missing destination, got {other:?}"),
    }
    // No export work was attempted and nothing was staged.
    assert!(!source.called.load(Ordering::SeqCst));
    assert!(storage.keys().is_empty());
}

#[tokio::test]
async fn test_manifest_cap_splits_loads_in_order() {
    let staging = tempfile::tempdir().unwrap();
    let storage = Arc::new(MemoryStore::default());
    let warehouse = Arc::new(MockWarehouse::new());
    let orchestrator = orchestrator(
        Arc::new(CsvFixtureSource::new(25)),
        storage.clone(),
        warehouse.clone(),
    )
    .with_manifest_max_entries(2);

    let outcome = orchestrator
        .transfer(csv_request(staging.path(), 5))
        .await
        .unwrap();

    assert_eq!(outcome.chunks, 5);
    assert_eq!(outcome.manifests, 3);
    // 5 chunks + 3 manifests retained.
    assert_eq!(outcome.objects.len(), 8);

    // Manifest keys carry their entry blocks; loads run in block order.
    let manifest_keys: Vec<String> = storage
        .keys()
        .into_iter()
        .filter(|k| k.ends_with(".manifest"))
        .collect();
    assert_eq!(manifest_keys.len(), 3);
    assert!(manifest_keys[0].ends_with("_0-2.manifest"));
    assert!(manifest_keys[1].ends_with("_2-4.manifest"));
    assert!(manifest_keys[2].ends_with("_4-5.manifest"));

    let statements = warehouse.executed();
    assert_eq!(statements.len(), 3);
    for (statement, key) in statements.iter().zip(&manifest_keys) {
        assert!(statement.contains(&format!("FROM 's3://staging-bucket/{key}'")));
    }
}

#[tokio::test]
async fn test_partial_load_failure_still_rolls_back_everything() {
    let staging = tempfile::tempdir().unwrap();
    let storage = Arc::new(MemoryStore::default());
    // First manifest loads, the second fails.
    let warehouse = Arc::new(MockWarehouse::failing_on(1));
    let orchestrator = orchestrator(
        Arc::new(CsvFixtureSource::new(12)),
        storage.clone(),
        warehouse.clone(),
    )
    .with_manifest_max_entries(2);

    let err = orchestrator
        .transfer(csv_request(staging.path(), 4))
        .await
        .unwrap_err();

    assert!(matches!(err, WharfError::Load(_)));
    assert_eq!(warehouse.executed().len(), 1);

    // 4 chunks + 2 manifests all rolled back despite the first load
    // having succeeded.
    let deletes = storage.deletes.lock().unwrap();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].len(), 6);
    assert!(storage.keys().is_empty());
}

#[tokio::test]
async fn test_caller_supplied_field_mapping_wins() {
    let staging = tempfile::tempdir().unwrap();
    let storage = Arc::new(MemoryStore::default());
    let warehouse = Arc::new(MockWarehouse::new());
    let orchestrator = orchestrator(
        Arc::new(JsonDocumentSource::new(vec![json!({"a": 1})])),
        storage.clone(),
        warehouse.clone(),
    );

    let mut request = csv_request(staging.path(), 1);
    request.format = DataFormat::Json;
    request.jsonpaths = Some(wharf_core::jsonpaths::JsonPaths {
        jsonpaths: vec!["$['custom']".to_string()],
    });
    orchestrator.transfer(request).await.unwrap();

    let jsonpaths_key = storage
        .keys()
        .into_iter()
        .find(|k| k.ends_with(".jsonpaths"))
        .unwrap();
    assert_eq!(
        String::from_utf8(storage.payload(&jsonpaths_key).unwrap()).unwrap(),
        r#"{"jsonpaths":["$['custom']"]}"#
    );
}
