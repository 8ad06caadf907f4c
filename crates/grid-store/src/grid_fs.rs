//! GridFs - the chunked file store backed by SQLite + object storage.
//!
//! File records live in SQLite; each record's content is split into
//! `chunk_size` wide objects stored under `chunks/{id}/{n}`.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::database::Database;
use crate::error::{GridStoreError, Result};
use crate::record::{Chunk, FileId, GridFileRecord};
use crate::storage::{ObjectStoreConfig, Storage};
use crate::store::GridStore;

/// Default chunk size for new files (255 KiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 255 * 1024;

/// Chunked file store combining SQLite records with object storage.
///
/// # Example
///
/// ```rust,no_run
/// use grid_store::{GridFs, GridStore};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), grid_store::GridStoreError> {
/// let fs = GridFs::new_local(Path::new("/tmp/grid"), 4096).await?;
/// let record = fs.store_file("/hello.txt", b"hello", "text/plain").await?;
/// let chunk = fs.fetch_chunk(&record, 0).await?;
/// assert_eq!(chunk.data(), b"hello");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct GridFs {
    db: Database,
    storage: Storage,
    chunk_size: u64,
}

impl GridFs {
    /// Create a new GridFs with a file-based SQLite database.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `config` - Object storage configuration (S3, MinIO, local, or memory)
    /// * `chunk_size` - Chunk width for newly stored files
    pub async fn new(db_path: &Path, config: ObjectStoreConfig, chunk_size: u64) -> Result<Self> {
        Self::check_chunk_size(chunk_size)?;
        let db = Database::new(db_path).await?;
        let storage = Storage::new(config).await?;
        Ok(Self {
            db,
            storage,
            chunk_size,
        })
    }

    /// Create a new GridFs backed by local filesystem.
    ///
    /// The database lands at `data_dir/grid.db`, chunks under `data_dir/objects/`.
    pub async fn new_local(data_dir: &Path, chunk_size: u64) -> Result<Self> {
        let db_path = data_dir.join("grid.db");
        let config = ObjectStoreConfig::Local {
            path: data_dir.join("objects"),
        };
        Self::new(&db_path, config, chunk_size).await
    }

    /// Create a fully ephemeral GridFs (in-memory DB + in-memory object storage).
    ///
    /// Data will be lost when the GridFs is dropped. Useful for testing.
    pub async fn new_ephemeral(chunk_size: u64) -> Result<Self> {
        Self::check_chunk_size(chunk_size)?;
        let db = Database::in_memory().await?;
        let storage = Storage::new(ObjectStoreConfig::Memory).await?;
        Ok(Self {
            db,
            storage,
            chunk_size,
        })
    }

    fn check_chunk_size(chunk_size: u64) -> Result<()> {
        if chunk_size == 0 {
            return Err(GridStoreError::InvalidConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Chunk width used for newly stored files.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }
}

#[async_trait]
impl GridStore for GridFs {
    async fn find_file(&self, filename: &str) -> Result<Option<GridFileRecord>> {
        self.db.find_latest(filename).await
    }

    async fn fetch_chunk(&self, file: &GridFileRecord, n: u64) -> Result<Chunk> {
        match self.storage.get_chunk(&file.id, n).await? {
            Some(data) => {
                debug!(file_id = %file.id, chunk = n, size = data.len(), "fetched chunk");
                Ok(Chunk::new(n, data))
            }
            None => Err(GridStoreError::ChunkNotFound { file_id: file.id, n }),
        }
    }

    async fn store_file(
        &self,
        filename: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<GridFileRecord> {
        let record = GridFileRecord {
            id: FileId::new(),
            filename: filename.to_string(),
            length: data.len() as u64,
            chunk_size: self.chunk_size,
            content_type: content_type.to_string(),
            upload_date: chrono::Utc::now().timestamp_millis(),
        };

        debug!(
            file_id = %record.id,
            filename = %filename,
            size = data.len(),
            chunks = record.chunk_count(),
            "storing file"
        );

        // Chunks go first: a visible record must never reference missing chunks
        for (n, chunk) in data.chunks(self.chunk_size as usize).enumerate() {
            self.storage
                .put_chunk(&record.id, n as u64, Bytes::copy_from_slice(chunk))
                .await?;
        }
        self.db.insert_file(&record).await?;

        info!(file_id = %record.id, filename = %filename, size = record.length, "file stored");
        Ok(record)
    }

    async fn set_length(&self, id: &FileId, length: u64) -> Result<()> {
        if !self.db.set_length(id, length).await? {
            return Err(GridStoreError::NotFound(id.to_string()));
        }
        debug!(file_id = %id, length = length, "file length updated");
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<GridFileRecord>> {
        self.db.list_latest().await
    }

    async fn remove_file(&self, filename: &str) -> Result<bool> {
        let versions = self.db.versions(filename).await?;
        if versions.is_empty() {
            return Ok(false);
        }

        for id in &versions {
            // Record first, so a half-removed version is never visible with missing chunks
            self.db.delete_file(id).await?;
            if let Err(e) = self.storage.delete_chunks(id).await {
                warn!(file_id = %id, error = %e, "failed to delete chunks of removed file");
            }
        }

        info!(filename = %filename, versions = versions.len(), "file removed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_splits_into_chunks() {
        let fs = GridFs::new_ephemeral(3).await.unwrap();

        let record = fs
            .store_file("/abc.txt", b"abcdefg", "text/plain")
            .await
            .unwrap();
        assert_eq!(record.length, 7);
        assert_eq!(record.chunk_size, 3);
        assert_eq!(record.chunk_count(), 3);

        let chunks: Vec<Vec<u8>> = futures::future::try_join_all(
            (0..3).map(|n| fs.fetch_chunk(&record, n)),
        )
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.data().to_vec())
        .collect();
        assert_eq!(chunks, vec![b"abc".to_vec(), b"def".to_vec(), b"g".to_vec()]);

        let err = fs.fetch_chunk(&record, 3).await.unwrap_err();
        assert!(matches!(err, GridStoreError::ChunkNotFound { n: 3, .. }));
    }

    #[tokio::test]
    async fn test_store_empty_file() {
        let fs = GridFs::new_ephemeral(16).await.unwrap();

        let record = fs.store_file("/empty", b"", "text/plain").await.unwrap();
        assert_eq!(record.length, 0);
        assert_eq!(record.chunk_count(), 0);

        let found = fs.find_file("/empty").await.unwrap().unwrap();
        assert_eq!(found.id, record.id);
    }

    #[tokio::test]
    async fn test_find_returns_newest_version() {
        let fs = GridFs::new_ephemeral(4).await.unwrap();

        fs.store_file("/f", b"first", "text/plain").await.unwrap();
        let second = fs.store_file("/f", b"second", "text/plain").await.unwrap();

        let found = fs.find_file("/f").await.unwrap().unwrap();
        assert_eq!(found.id, second.id);
        assert_eq!(found.length, 6);

        let listed = fs.list_files().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, second.id);
    }

    #[tokio::test]
    async fn test_set_length_is_partial_update() {
        let fs = GridFs::new_ephemeral(4).await.unwrap();

        let record = fs
            .store_file("/f", b"abcdefg", "text/csv")
            .await
            .unwrap();
        fs.set_length(&record.id, 0).await.unwrap();

        let found = fs.find_file("/f").await.unwrap().unwrap();
        assert_eq!(found.id, record.id);
        assert_eq!(found.length, 0);
        assert_eq!(found.chunk_size, 4);
        assert_eq!(found.content_type, "text/csv");

        let err = fs.set_length(&FileId::new(), 0).await.unwrap_err();
        assert!(matches!(err, GridStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_file() {
        let fs = GridFs::new_ephemeral(2).await.unwrap();

        let old = fs.store_file("/f", b"abcd", "text/plain").await.unwrap();
        fs.store_file("/f", b"xy", "text/plain").await.unwrap();

        assert!(fs.remove_file("/f").await.unwrap());
        assert!(fs.find_file("/f").await.unwrap().is_none());
        assert!(fs.fetch_chunk(&old, 0).await.is_err());
        assert!(!fs.remove_file("/f").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_store_persists() {
        let temp_dir = tempfile::tempdir().unwrap();

        let id = {
            let fs = GridFs::new_local(temp_dir.path(), 4).await.unwrap();
            fs.store_file("/kept", b"persisted", "text/plain")
                .await
                .unwrap()
                .id
        };

        assert!(temp_dir.path().join("grid.db").exists());

        let fs = GridFs::new_local(temp_dir.path(), 4).await.unwrap();
        let record = fs.find_file("/kept").await.unwrap().unwrap();
        assert_eq!(record.id, id);
        let chunk = fs.fetch_chunk(&record, 2).await.unwrap();
        assert_eq!(chunk.data(), b"d");
    }

    #[tokio::test]
    async fn test_zero_chunk_size_rejected() {
        let err = GridFs::new_ephemeral(0).await.unwrap_err();
        assert!(matches!(err, GridStoreError::InvalidConfig(_)));
    }
}
