//! Object storage backend for chunk data (S3/MinIO/local filesystem/memory).

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};

use crate::error::{GridStoreError, Result};
use crate::FileId;

/// Configuration for the object storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Local filesystem storage
    Local {
        /// Path to the storage directory
        path: PathBuf,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
        endpoint: String,
        /// Access key ID
        access_key: String,
        /// Secret access key
        secret_key: String,
        /// Bucket name
        bucket: String,
        /// Optional region (defaults to "us-east-1")
        region: Option<String>,
    },
}

/// Wrapper around the different object storage backends, keyed by chunk.
#[derive(Debug, Clone)]
pub(crate) struct Storage {
    inner: Arc<dyn ObjectStore>,
}

impl Storage {
    /// Create a new storage backend from configuration.
    pub async fn new(config: ObjectStoreConfig) -> Result<Self> {
        let inner: Arc<dyn ObjectStore> = match &config {
            ObjectStoreConfig::Memory => Arc::new(InMemory::new()),

            ObjectStoreConfig::Local { path } => {
                tokio::fs::create_dir_all(path).await?;
                Arc::new(
                    LocalFileSystem::new_with_prefix(path)
                        .map_err(|e| GridStoreError::InvalidConfig(e.to_string()))?,
                )
            }

            ObjectStoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                let builder = AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_bucket_name(bucket)
                    .with_region(region.as_deref().unwrap_or("us-east-1"))
                    .with_allow_http(endpoint.starts_with("http://"));

                let store: Arc<dyn ObjectStore> = Arc::new(
                    builder
                        .build()
                        .map_err(|e| GridStoreError::InvalidConfig(e.to_string()))?,
                );

                // Fail fast on a missing bucket rather than on the first chunk upload
                let prefix = ObjectPath::from("");
                let first = store.list(Some(&prefix)).try_next().await;
                match first {
                    Ok(_) => {}
                    Err(object_store::Error::NotFound { .. }) => {
                        return Err(GridStoreError::BucketNotFound(bucket.clone()));
                    }
                    Err(e) => {
                        let msg = e.to_string();
                        if msg.contains("NoSuchBucket") {
                            return Err(GridStoreError::BucketNotFound(bucket.clone()));
                        }
                        return Err(e.into());
                    }
                }

                store
            }
        };

        Ok(Self { inner })
    }

    fn chunk_path(file_id: &FileId, n: u64) -> ObjectPath {
        ObjectPath::from(format!("chunks/{}/{}", file_id, n))
    }

    fn file_prefix(file_id: &FileId) -> ObjectPath {
        ObjectPath::from(format!("chunks/{}", file_id))
    }

    /// Put one chunk object.
    pub async fn put_chunk(&self, file_id: &FileId, n: u64, data: Bytes) -> Result<()> {
        let path = Self::chunk_path(file_id, n);
        self.inner.put(&path, data.into()).await?;
        Ok(())
    }

    /// Get one chunk object, `None` if it does not exist.
    pub async fn get_chunk(&self, file_id: &FileId, n: u64) -> Result<Option<Bytes>> {
        let path = Self::chunk_path(file_id, n);
        match self.inner.get(&path).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every chunk object of a file. Returns the number removed.
    pub async fn delete_chunks(&self, file_id: &FileId) -> Result<usize> {
        let prefix = Self::file_prefix(file_id);
        let items: Vec<_> = self.inner.list(Some(&prefix)).try_collect().await?;

        let mut removed = 0;
        for meta in items {
            // Ignore NotFound - a concurrent remover may have won
            match self.inner.delete(&meta.location).await {
                Ok(()) => removed += 1,
                Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
impl Storage {
    /// Create an in-memory storage backend (test-only).
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
        }
    }

    /// Check if a chunk object exists in storage.
    pub async fn has_chunk(&self, file_id: &FileId, n: u64) -> Result<bool> {
        let path = Self::chunk_path(file_id, n);
        match self.inner.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
