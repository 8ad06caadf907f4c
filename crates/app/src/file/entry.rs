//! The open-file facade handed to the FUSE layer.

use std::sync::Arc;

use grid_store::GridStore;

use super::error::FileError;
use super::reader::ChunkReader;
use super::writer::StagingWriter;

/// Notified after a handle changes the stored file at `path`.
pub trait UpdateListener: Send + Sync {
    fn synchronize_update(&self, path: &str);
}

/// One open file of the mounted grid store.
///
/// A handle is opened either for reading or for writing. Reads always go
/// to the committed blob through the chunk cache; writes only ever touch
/// the staging region until [`store`] hands them to the backing store.
///
/// [`store`]: GridFile::store
pub struct GridFile {
    path: String,
    store: Arc<dyn GridStore>,
    reader: ChunkReader,
    writer: Option<StagingWriter>,
    listener: Option<Arc<dyn UpdateListener>>,
}

impl GridFile {
    /// Open `path` for reading. Metadata loads on first use.
    pub fn open_read(path: impl Into<String>, store: Arc<dyn GridStore>) -> Self {
        Self {
            path: path.into(),
            store,
            reader: ChunkReader::new(),
            writer: None,
            listener: None,
        }
    }

    /// Open `path` for writing, staging in chunks of `chunk_size` bytes.
    pub fn open_write(path: impl Into<String>, store: Arc<dyn GridStore>, chunk_size: u64) -> Self {
        Self {
            path: path.into(),
            store,
            reader: ChunkReader::new(),
            writer: Some(StagingWriter::new(chunk_size)),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn UpdateListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_writable(&self) -> bool {
        self.writer.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.writer.as_ref().is_some_and(StagingWriter::is_dirty)
    }

    /// Bytes staged since open or the last commit.
    pub fn written(&self) -> u64 {
        self.writer.as_ref().map_or(0, StagingWriter::written)
    }

    /// Current size of the staging region in bytes.
    pub fn staging_capacity(&self) -> usize {
        self.writer.as_ref().map_or(0, StagingWriter::capacity)
    }

    /// Length of the committed file as seen by reads.
    pub async fn logical_length(&self) -> Result<u64, FileError> {
        let record = self.reader.record(&self.path, self.store.as_ref()).await?;
        Ok(record.length)
    }

    /// Index of the chunk currently cached for reads.
    pub async fn cached_chunk(&self) -> Option<u64> {
        self.reader.cached_chunk().await
    }

    /// Read into `buf` starting at `offset`. Returns the bytes copied.
    pub async fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize, FileError> {
        self.reader
            .read(&self.path, self.store.as_ref(), buf, offset)
            .await
    }

    /// Stage `data` at `offset`. Only prefix writes are accepted.
    pub fn write(&mut self, data: &[u8], offset: u64) -> Result<usize, FileError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| FileError::ReadOnly(self.path.clone()))?;
        writer.write(&self.path, data, offset)
    }

    /// Commit the staged bytes as a new version of the file.
    ///
    /// On failure the staged bytes are kept so the commit can be retried.
    pub async fn store(&mut self) -> Result<(), FileError> {
        if self.writer.is_none() {
            return Err(FileError::ReadOnly(self.path.clone()));
        }
        let content_type = self.content_type().await?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| FileError::ReadOnly(self.path.clone()))?;

        let record = match self
            .store
            .store_file(&self.path, writer.staged(), &content_type)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    path = %self.path,
                    staged = writer.written(),
                    error = %e,
                    "commit failed, keeping staged bytes"
                );
                return Err(e.into());
            }
        };

        writer.release();
        tracing::info!(
            path = %self.path,
            file_id = %record.id,
            length = record.length,
            "committed file"
        );
        self.reader.set_record(record);
        self.synchronize_update();
        Ok(())
    }

    /// Zero the length of the stored file in place.
    ///
    /// This updates the existing record rather than writing a new version.
    /// The handle's view is refreshed only when the update succeeds.
    pub async fn truncate(&mut self) -> Result<(), FileError> {
        let record = self.reader.record(&self.path, self.store.as_ref()).await?;
        let id = record.id;

        self.store.set_length(&id, 0).await?;
        tracing::info!(path = %self.path, file_id = %id, "truncated file");

        self.reader.reset();
        self.synchronize_update();
        Ok(())
    }

    /// Tell the filesystem layer that cached state for this path is stale.
    pub fn synchronize_update(&self) {
        if let Some(listener) = &self.listener {
            listener.synchronize_update(&self.path);
        }
    }

    /// Content type of the stored file, guessed from the path for a new one.
    async fn content_type(&self) -> Result<String, FileError> {
        match self.reader.record(&self.path, self.store.as_ref()).await {
            Ok(record) => Ok(record.content_type.clone()),
            Err(FileError::NotFound(_)) => Ok(mime_guess::from_path(&self.path)
                .first_or_octet_stream()
                .essence_str()
                .to_string()),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for GridFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridFile")
            .field("path", &self.path)
            .field("reader", &self.reader)
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

impl Drop for GridFile {
    fn drop(&mut self) {
        if self.is_dirty() {
            tracing::warn!(
                path = %self.path,
                staged = self.written(),
                "dropping handle with uncommitted writes"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_store::GridFs;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        updates: Mutex<Vec<String>>,
    }

    impl UpdateListener for Recorder {
        fn synchronize_update(&self, path: &str) {
            self.updates.lock().push(path.to_string());
        }
    }

    async fn store(chunk_size: u64) -> Arc<dyn GridStore> {
        Arc::new(GridFs::new_ephemeral(chunk_size).await.unwrap())
    }

    #[tokio::test]
    async fn test_read_handle_rejects_writes() {
        let store = store(4).await;
        let mut file = GridFile::open_read("/f", store);

        let err = file.write(b"abc", 0).unwrap_err();
        assert!(matches!(err, FileError::ReadOnly(_)));
        assert!(matches!(file.store().await, Err(FileError::ReadOnly(_))));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let store = store(4).await;
        let file = GridFile::open_read("/missing", store);

        let mut buf = [0u8; 4];
        let err = file.read(&mut buf, 0).await.unwrap_err();
        assert!(matches!(err, FileError::NotFound(_)));
        assert_eq!(err.errno(), libc::ENOENT);
    }

    #[tokio::test]
    async fn test_commit_notifies_listener() {
        let store = store(4).await;
        let recorder = Arc::new(Recorder::default());
        let mut file = GridFile::open_write("/notes.txt", store.clone(), 4)
            .with_listener(recorder.clone());

        file.write(b"hello", 0).unwrap();
        file.store().await.unwrap();

        assert_eq!(*recorder.updates.lock(), vec!["/notes.txt".to_string()]);
        let record = store.find_file("/notes.txt").await.unwrap().unwrap();
        assert_eq!(record.content_type, "text/plain");
        assert_eq!(file.logical_length().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_recommit_keeps_content_type() {
        let store = store(4).await;
        store.store_file("/data", b"1,2", "text/csv").await.unwrap();

        let mut file = GridFile::open_write("/data", store.clone(), 4);
        assert_eq!(file.logical_length().await.unwrap(), 3);
        file.write(b"3,4,5", 0).unwrap();
        file.store().await.unwrap();

        let record = store.find_file("/data").await.unwrap().unwrap();
        assert_eq!(record.content_type, "text/csv");
        assert_eq!(record.length, 5);
    }

    #[tokio::test]
    async fn test_rewrite_without_read_keeps_content_type() {
        let store = store(4).await;
        store
            .store_file("/notes.txt", b"old", "application/octet-stream")
            .await
            .unwrap();

        let mut file = GridFile::open_write("/notes.txt", store.clone(), 4);
        file.write(b"new", 0).unwrap();
        file.store().await.unwrap();

        let record = store.find_file("/notes.txt").await.unwrap().unwrap();
        assert_eq!(record.content_type, "application/octet-stream");
        assert_eq!(record.length, 3);
    }

    #[tokio::test]
    async fn test_drop_dirty_handle_discards_staging() {
        let store = store(4).await;
        let recorder = Arc::new(Recorder::default());
        let mut file = GridFile::open_write("/scratch", store.clone(), 4)
            .with_listener(recorder.clone());
        file.write(b"never committed", 0).unwrap();
        assert!(file.is_dirty());
        assert_eq!(file.staging_capacity(), 16);
        drop(file);

        assert!(store.find_file("/scratch").await.unwrap().is_none());
        assert!(recorder.updates.lock().is_empty());

        let reopened = GridFile::open_write("/scratch", store, 4);
        assert!(!reopened.is_dirty());
        assert_eq!(reopened.written(), 0);
        assert_eq!(reopened.staging_capacity(), 0);
    }

    #[tokio::test]
    async fn test_truncate_missing_file() {
        let store = store(4).await;
        let recorder = Arc::new(Recorder::default());
        let mut file = GridFile::open_read("/missing", store).with_listener(recorder.clone());

        assert!(matches!(file.truncate().await, Err(FileError::NotFound(_))));
        assert!(recorder.updates.lock().is_empty());
    }
}
