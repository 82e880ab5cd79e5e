//! Error types for wharf

use thiserror::Error;

/// Result type alias for wharf operations
pub type Result<T> = std::result::Result<T, WharfError>;

/// Main error type for wharf transfer operations.
///
/// Variants map to the stage of the pipeline that failed. Cleanup problems
/// during rollback are logged, never raised, so they have no variant here.
#[derive(Error, Debug)]
pub enum WharfError {
    /// The transfer request itself is malformed; surfaced before any I/O
    #[error("Invalid transfer request: {0}")]
    InvalidRequest(String),

    /// The destination table is not present in the warehouse
    #[error("Destination table '{0}' does not exist in the warehouse")]
    DestinationMissing(String),

    /// Extracting the source result set to the staging area failed
    #[error("Source export failed: {0}")]
    Export(#[from] SourceError),

    /// A chunk upload failed, or uploaded rows diverged from exported rows
    #[error("Chunk upload failed: {0}")]
    Upload(String),

    /// Building or uploading a manifest or field-mapping document failed
    #[error("Manifest stage failed: {0}")]
    Manifest(String),

    /// The warehouse rejected a bulk-load statement
    #[error("Bulk load failed: {0}")]
    Load(String),

    /// A warehouse operation outside the load itself failed (e.g. the
    /// destination existence probe)
    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from a source connector while materializing the staging artifact.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to write staging artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Staging artifact is not valid {format}: {message}")]
    Malformed { format: String, message: String },
}

/// Errors from the object-storage client.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to put object s3://{bucket}/{key}: {message}")]
    Put {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Failed to get object s3://{bucket}/{key}: {message}")]
    Get {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Failed to delete {count} objects from bucket '{bucket}': {message}")]
    Delete {
        bucket: String,
        count: usize,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the warehouse SQL executor.
#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("Warehouse database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Statement failed: {0}")]
    Statement(String),
}
