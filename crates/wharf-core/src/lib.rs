//! Wharf Core Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Administrative and bulk-data-movement operations for a columnar
//! analytical warehouse, staged through S3-compatible object storage.
//!
//! # Overview
//!
//! The heart of this crate is the bulk table-transfer pipeline: it extracts
//! a relational result set to a local staging artifact, partitions it into
//! bounded gzip chunks, uploads the chunks, builds one or more manifest
//! documents describing them, and submits an atomic bulk-load statement per
//! manifest, rolling back every staged storage object if any stage fails.
//!
//! - **Partitioning**: [`partition`] computes the contiguous row ranges
//!   covering an export
//! - **Credentials**: [`credentials`] resolves the bulk-load credential
//!   encoding (explicit keys or an assumed IAM role)
//! - **Manifests**: [`manifest`] assembles the load manifests
//! - **Field mapping**: [`jsonpaths`] derives field-access paths for
//!   JSON-shaped loads
//! - **Export & upload**: [`export`] cuts the staged extract into chunks
//!   and uploads them one at a time
//! - **Orchestration**: [`transfer`] drives the whole pipeline and owns the
//!   rollback ledger
//! - **Administration**: [`admin`] generates user-management SQL batches
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wharf_core::credentials::AwsCredentials;
//! use wharf_core::request::TransferRequest;
//! use wharf_core::source::PostgresSource;
//! use wharf_core::storage::{S3Storage, StorageConfig};
//! use wharf_core::transfer::TransferOrchestrator;
//! use wharf_core::warehouse::{RedshiftWarehouse, WarehouseConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = PostgresSource::connect("postgres://localhost/app").await?;
//!     let storage = S3Storage::new(StorageConfig::from_env());
//!     let warehouse = RedshiftWarehouse::connect(&WarehouseConfig::from_env()).await?;
//!
//!     let orchestrator = TransferOrchestrator::new(
//!         Arc::new(source),
//!         Arc::new(storage),
//!         Arc::new(warehouse),
//!         AwsCredentials::from_env()?,
//!     );
//!
//!     let request = TransferRequest::builder()
//!         .table("public.events")
//!         .destination_table("analytics.events")
//!         .bucket("staging-bucket")
//!         .key_prefix("backfills/events")
//!         .slices(16)
//!         .build()?;
//!
//!     let outcome = orchestrator.transfer(request).await?;
//!     println!("Transferred {} rows", outcome.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod credentials;
pub mod error;
pub mod export;
pub mod jsonpaths;
pub mod logging;
pub mod manifest;
pub mod partition;
pub mod request;
pub mod source;
pub mod statement;
pub mod storage;
pub mod transfer;
pub mod warehouse;

// Re-export commonly used types
pub use credentials::AwsCredentials;
pub use error::{Result, WharfError};
pub use request::{DataFormat, SourceSpec, TransferRequest};
pub use storage::ObjectHandle;
pub use transfer::{TransferOrchestrator, TransferOutcome};
