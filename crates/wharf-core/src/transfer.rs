//! Transfer orchestration.
//!
//! Drives one transfer end to end: destination probe, chunk export and
//! upload, manifest construction and upload, field-mapping upload for
//! JSON-shaped input, then one bulk-load statement per manifest, in order.
//! Every storage object written along the way is recorded so a failure at
//! any stage can roll all of them back. Staged objects are retained after a
//! successful transfer; only failures trigger automatic deletion.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::credentials::AwsCredentials;
use crate::error::{Result, WharfError};
use crate::export::ChunkExporter;
use crate::jsonpaths::{generate_jsonpaths, JsonPaths};
use crate::manifest::ManifestBuilder;
use crate::request::{DataFormat, TransferRequest};
use crate::source::SourceConnector;
use crate::statement::{CopyFormat, CopyStatement};
use crate::storage::{ObjectHandle, ObjectStore};
use crate::warehouse::Warehouse;

/// Default cap on source objects referenced by a single load statement.
pub const DEFAULT_MANIFEST_MAX_ENTRIES: usize = 64;

/// Result of a completed transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Unique identifier for this transfer attempt
    pub transfer_id: Uuid,
    /// Destination table that was loaded
    pub destination_table: String,
    /// Rows moved from the source into the warehouse
    pub rows_transferred: u64,
    /// Number of staged chunk objects
    pub chunks: usize,
    /// Number of manifest documents loaded
    pub manifests: usize,
    /// When the transfer started
    pub started_at: DateTime<Utc>,
    /// When the transfer completed
    pub completed_at: DateTime<Utc>,
    /// Staged objects retained in storage after success
    pub objects: Vec<ObjectHandle>,
}

/// Top-level driver for bulk transfers.
///
/// Holds the injected collaborators for the duration of its transfers; each
/// [`TransferOrchestrator::transfer`] call is independent and owns its own
/// object-handle ledger.
pub struct TransferOrchestrator {
    source: Arc<dyn SourceConnector>,
    storage: Arc<dyn ObjectStore>,
    warehouse: Arc<dyn Warehouse>,
    credentials: AwsCredentials,
    manifest_max_entries: usize,
}

impl TransferOrchestrator {
    pub fn new(
        source: Arc<dyn SourceConnector>,
        storage: Arc<dyn ObjectStore>,
        warehouse: Arc<dyn Warehouse>,
        credentials: AwsCredentials,
    ) -> Self {
        Self {
            source,
            storage,
            warehouse,
            credentials,
            manifest_max_entries: DEFAULT_MANIFEST_MAX_ENTRIES,
        }
    }

    /// Cap the number of source objects referenced by a single load.
    pub fn with_manifest_max_entries(mut self, max_entries: usize) -> Self {
        self.manifest_max_entries = max_entries;
        self
    }

    /// Run one transfer to completion.
    ///
    /// The destination table must already exist. On failure after any
    /// object has been staged, and if the request asks for it, every
    /// recorded object is deleted best-effort before the original error is
    /// returned; cleanup problems are logged, never raised.
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferOutcome> {
        let transfer_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            transfer_id = %transfer_id,
            destination = %request.destination_table,
            "Validating transfer"
        );

        if !self
            .warehouse
            .table_exists(&request.destination_table)
            .await?
        {
            return Err(WharfError::DestinationMissing(
                request.destination_table.clone(),
            ));
        }

        let stamp = started_at.format("%Y-%m-%d_%H-%M-%S").to_string();
        let mut objects: Vec<ObjectHandle> = Vec::new();

        match self.run_pipeline(&request, &stamp, &mut objects).await {
            Ok((rows_transferred, chunks, manifests)) => {
                let outcome = TransferOutcome {
                    transfer_id,
                    destination_table: request.destination_table.clone(),
                    rows_transferred,
                    chunks,
                    manifests,
                    started_at,
                    completed_at: Utc::now(),
                    objects,
                };
                info!(
                    transfer_id = %transfer_id,
                    rows = outcome.rows_transferred,
                    chunks = outcome.chunks,
                    manifests = outcome.manifests,
                    "Transfer succeeded"
                );
                Ok(outcome)
            }
            Err(error) => {
                if request.cleanup_storage_on_failure && !objects.is_empty() {
                    self.rollback(&request, &objects).await;
                }
                warn!(transfer_id = %transfer_id, error = %error, "Transfer failed");
                Err(error)
            }
        }
    }

    /// The fallible stages of one transfer. Every uploaded object is pushed
    /// into `objects` the moment its upload succeeds, so the caller can
    /// roll back whatever exists when an error surfaces.
    async fn run_pipeline(
        &self,
        request: &TransferRequest,
        stamp: &str,
        objects: &mut Vec<ObjectHandle>,
    ) -> Result<(u64, usize, usize)> {
        info!("Exporting source and uploading chunks");
        let exporter = ChunkExporter::new(&*self.source, &*self.storage);
        let outcome = exporter.export_and_upload(request, stamp).await?;
        objects.extend(outcome.handles.iter().cloned());

        let mut builder = ManifestBuilder::new().max_entries(self.manifest_max_entries);
        for handle in &outcome.handles {
            builder.push(handle.url());
        }
        info!(entries = builder.len(), "Building manifests");
        let manifests = builder.build();

        let mut manifest_handles = Vec::with_capacity(manifests.len());
        let mut block_start = 0usize;
        for manifest in &manifests {
            let block_end = block_start + manifest.entries.len();
            let key = format!("{}{}_{}-{}.manifest", request.key_prefix, stamp, block_start, block_end);
            let handle = self
                .storage
                .put_bytes(&request.bucket, &key, manifest.to_json()?)
                .await
                .map_err(|e| WharfError::Manifest(e.to_string()))?;
            objects.push(handle.clone());
            manifest_handles.push(handle);
            block_start = block_end;
        }

        let copy_format = match request.format {
            DataFormat::Csv => CopyFormat::Csv,
            DataFormat::Json => {
                let jsonpaths = self.resolve_jsonpaths(request, outcome.sample.as_ref())?;
                let key = format!("{}{}.jsonpaths", request.key_prefix, stamp);
                let handle = self
                    .storage
                    .put_bytes(&request.bucket, &key, jsonpaths.to_json()?)
                    .await
                    .map_err(|e| WharfError::Manifest(e.to_string()))?;
                objects.push(handle.clone());
                CopyFormat::Json {
                    jsonpaths_url: handle.url(),
                }
            }
        };

        for (index, handle) in manifest_handles.iter().enumerate() {
            info!(manifest = index, url = %handle.url(), "Loading manifest");
            let statement = CopyStatement::new(
                &request.destination_table,
                handle.url(),
                &self.credentials,
                copy_format.clone(),
            );
            let rows_affected = self
                .warehouse
                .execute(&statement.render())
                .await
                .map_err(|e| WharfError::Load(e.to_string()))?;
            info!(manifest = index, rows_affected, "Manifest loaded");
        }

        Ok((outcome.rows, outcome.handles.len(), manifests.len()))
    }

    /// Use the caller-supplied field mapping, or derive one from the first
    /// staged document.
    fn resolve_jsonpaths(
        &self,
        request: &TransferRequest,
        sample: Option<&serde_json::Value>,
    ) -> Result<JsonPaths> {
        if let Some(jsonpaths) = &request.jsonpaths {
            return Ok(jsonpaths.clone());
        }
        match sample {
            Some(sample) => Ok(generate_jsonpaths(sample, request.array_index)),
            None => Err(WharfError::Manifest(
                "cannot derive a field mapping: the export produced no sample document"
                    .to_string(),
            )),
        }
    }

    /// Best-effort deletion of every object this attempt wrote. Problems
    /// are logged so the triggering error is never masked.
    async fn rollback(&self, request: &TransferRequest, objects: &[ObjectHandle]) {
        warn!(
            count = objects.len(),
            bucket = %request.bucket,
            "Transfer failed; removing staged objects"
        );
        let keys: Vec<String> = objects.iter().map(|handle| handle.key.clone()).collect();
        if let Err(error) = self.storage.delete(&request.bucket, &keys).await {
            warn!(error = %error, "Cleanup of staged objects failed");
        }
    }
}
