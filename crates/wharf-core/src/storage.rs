//! Object-storage client interface and S3 implementation.
//!
//! The transfer pipeline only needs put/get/delete/list of named objects;
//! everything else (retries, multipart, encryption) is the client's
//! concern. [`S3Storage`] is the production implementation; tests supply
//! in-memory implementations of [`ObjectStore`].

use std::env;
use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    types::{Delete, ObjectIdentifier},
    Client,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::StorageError;

/// Maximum keys a single batch-delete request may carry.
const DELETE_BATCH_SIZE: usize = 1000;

/// A (bucket, key) pair that has been written to storage.
///
/// Handles are recorded by the orchestrator the moment an upload succeeds,
/// so rollback-on-failure can delete everything a transfer attempt wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHandle {
    pub bucket: String,
    pub key: String,
}

impl ObjectHandle {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Full object URL as embedded in manifests and load statements.
    pub fn url(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

/// Object-storage operations the transfer pipeline consumes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write a byte payload to `bucket`/`key`.
    async fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
    ) -> Result<ObjectHandle, StorageError>;

    /// Upload a local file to `bucket`/`key`.
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<ObjectHandle, StorageError>;

    /// Fetch an object's full contents.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Delete the named keys from `bucket`.
    async fn delete(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError>;

    /// List keys under `prefix` in `bucket`.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Connection settings for the S3-compatible staging area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
    pub path_style: bool,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            access_key: env::var("S3_ACCESS_KEY")
                .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
            secret_key: env::var("S3_SECRET_KEY")
                .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
            session_token: env::var("AWS_SECURITY_TOKEN")
                .or_else(|_| env::var("AWS_SESSION_TOKEN"))
                .ok(),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    pub fn for_minio(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            session_token: None,
            path_style: true,
        }
    }
}

/// S3 implementation of [`ObjectStore`].
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    /// Build a client from explicit connection settings.
    pub fn new(config: StorageConfig) -> Self {
        debug!("Initializing storage client with config: {:?}", config);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            config.session_token.clone(),
            None,
            "wharf-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(s3_config_builder.build()),
        }
    }

    /// Build a client from the ambient AWS environment (credential chain,
    /// region, profile).
    pub async fn from_env() -> Self {
        let config = aws_config::load_from_env().await;
        Self {
            client: Client::new(&config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    #[instrument(skip(self, data))]
    async fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
    ) -> Result<ObjectHandle, StorageError> {
        debug!("Uploading {} bytes to s3://{}/{}", data.len(), bucket, key);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::Put {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })?;

        info!("Successfully uploaded to s3://{}/{}", bucket, key);
        Ok(ObjectHandle::new(bucket, key))
    }

    #[instrument(skip(self))]
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<ObjectHandle, StorageError> {
        debug!("Uploading {} to s3://{}/{}", path.display(), bucket, key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::Put {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Put {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })?;

        info!("Successfully uploaded to s3://{}/{}", bucket, key);
        Ok(ObjectHandle::new(bucket, key))
    }

    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Get {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Get {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);
        Ok(data)
    }

    #[instrument(skip(self, keys))]
    async fn delete(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError> {
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            let identifiers = batch
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::Delete {
                    bucket: bucket.to_string(),
                    count: batch.len(),
                    message: e.to_string(),
                })?;

            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .build()
                .map_err(|e| StorageError::Delete {
                    bucket: bucket.to_string(),
                    count: batch.len(),
                    message: e.to_string(),
                })?;

            self.client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| StorageError::Delete {
                    bucket: bucket.to_string(),
                    count: batch.len(),
                    message: e.to_string(),
                })?;
        }

        info!("Deleted {} objects from bucket '{}'", keys.len(), bucket);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .send()
            .await
            .map_err(|e| StorageError::Get {
                bucket: bucket.to_string(),
                key: prefix.to_string(),
                message: e.to_string(),
            })?;

        Ok(response
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(|k| k.to_string()))
            .collect())
    }
}
