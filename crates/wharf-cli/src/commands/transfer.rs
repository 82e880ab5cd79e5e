//! `wharf transfer` - bulk-load a source table or query into the warehouse

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use wharf_core::credentials::AwsCredentials;
use wharf_core::request::TransferRequest;
use wharf_core::source::PostgresSource;
use wharf_core::storage::{S3Storage, StorageConfig};
use wharf_core::transfer::TransferOrchestrator;
use wharf_core::warehouse::{RedshiftWarehouse, WarehouseConfig};

use crate::TransferArgs;

pub async fn run(args: TransferArgs) -> anyhow::Result<()> {
    let mut builder = TransferRequest::builder()
        .destination_table(&args.destination)
        .bucket(&args.bucket)
        .key_prefix(&args.prefix)
        .slices(args.slices)
        .cleanup_storage_on_failure(!args.keep_storage_on_failure)
        .cleanup_local_on_success(!args.keep_local)
        .cleanup_local_on_failure(!args.keep_local);
    if let Some(table) = &args.table {
        builder = builder.table(table);
    }
    if let Some(query) = &args.query {
        builder = builder.query(query);
    }
    if let Some(staging_dir) = &args.staging_dir {
        builder = builder.staging_dir(staging_dir);
    }
    let request = builder.build().context("Invalid transfer request")?;

    let source = PostgresSource::connect(&args.source_url)
        .await
        .context("Failed to connect to the source database")?;
    let storage = S3Storage::new(StorageConfig::from_env());
    let warehouse = RedshiftWarehouse::connect(&WarehouseConfig::from_env())
        .await
        .context("Failed to connect to the warehouse")?;
    let credentials =
        AwsCredentials::from_env().context("No usable bulk-load credentials configured")?;

    let orchestrator = TransferOrchestrator::new(
        Arc::new(source),
        Arc::new(storage),
        Arc::new(warehouse),
        credentials,
    )
    .with_manifest_max_entries(args.manifest_max_entries);

    info!(destination = %args.destination, "Starting transfer");
    let outcome = orchestrator.transfer(request).await?;

    println!(
        "Transferred {} rows to {} ({} chunks, {} manifests, transfer id {})",
        outcome.rows_transferred,
        outcome.destination_table,
        outcome.chunks,
        outcome.manifests,
        outcome.transfer_id,
    );
    Ok(())
}
