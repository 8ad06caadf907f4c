//! Shared helpers for the file handle integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use grid_store::{Chunk, FileId, GridFileRecord, GridFs, GridStore, GridStoreError, Result};
use parking_lot::Mutex;

/// Wraps an ephemeral [`GridFs`], recording chunk fetches and optionally
/// failing uploads and length updates.
pub struct RecordingStore {
    inner: GridFs,
    fetched: Mutex<Vec<u64>>,
    uploads: AtomicUsize,
    fail_uploads: AtomicBool,
    fail_set_length: AtomicBool,
}

impl RecordingStore {
    pub async fn new(chunk_size: u64) -> Arc<Self> {
        Arc::new(Self {
            inner: GridFs::new_ephemeral(chunk_size).await.unwrap(),
            fetched: Mutex::new(Vec::new()),
            uploads: AtomicUsize::new(0),
            fail_uploads: AtomicBool::new(false),
            fail_set_length: AtomicBool::new(false),
        })
    }

    /// Chunk indices fetched so far, in order.
    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().clone()
    }

    pub fn clear_fetched(&self) {
        self.fetched.lock().clear();
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_set_length(&self, fail: bool) {
        self.fail_set_length.store(fail, Ordering::SeqCst);
    }

    /// Seed a file directly, bypassing any handle.
    pub async fn seed(&self, filename: &str, data: &[u8]) -> GridFileRecord {
        self.inner
            .store_file(filename, data, "application/octet-stream")
            .await
            .unwrap()
    }
}

#[async_trait]
impl GridStore for RecordingStore {
    async fn find_file(&self, filename: &str) -> Result<Option<GridFileRecord>> {
        self.inner.find_file(filename).await
    }

    async fn fetch_chunk(&self, file: &GridFileRecord, n: u64) -> Result<Chunk> {
        self.fetched.lock().push(n);
        self.inner.fetch_chunk(file, n).await
    }

    async fn store_file(
        &self,
        filename: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<GridFileRecord> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(GridStoreError::InvalidConfig("uploads disabled".to_string()));
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.inner.store_file(filename, data, content_type).await
    }

    async fn set_length(&self, id: &FileId, length: u64) -> Result<()> {
        if self.fail_set_length.load(Ordering::SeqCst) {
            return Err(GridStoreError::InvalidConfig("updates disabled".to_string()));
        }
        self.inner.set_length(id, length).await
    }

    async fn list_files(&self) -> Result<Vec<GridFileRecord>> {
        self.inner.list_files().await
    }

    async fn remove_file(&self, filename: &str) -> Result<bool> {
        self.inner.remove_file(filename).await
    }
}

/// Read `size` bytes at `offset` through a handle, trimmed to what was read.
pub async fn read_at(file: &gridfuse::GridFile, size: usize, offset: u64) -> Vec<u8> {
    let mut buf = vec![0u8; size];
    let n = file.read(&mut buf, offset).await.unwrap();
    buf.truncate(n);
    buf
}
