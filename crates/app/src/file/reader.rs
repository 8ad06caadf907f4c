//! Chunk-aligned read path.
//!
//! Reads are split so every inner step touches exactly one chunk, which
//! is all a one-slot cache needs to serve sequential reads with a single
//! fetch per chunk.

use grid_store::{GridFileRecord, GridStore};
use tokio::sync::{Mutex, OnceCell};

use super::chunk_cache::ChunkCache;
use super::error::FileError;

/// Read side of a file handle: lazily loaded metadata plus the chunk cache.
#[derive(Debug, Default)]
pub struct ChunkReader {
    record: OnceCell<GridFileRecord>,
    cache: Mutex<ChunkCache>,
}

impl ChunkReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// The metadata record, fetched from the store on first use.
    pub async fn record(
        &self,
        path: &str,
        store: &dyn GridStore,
    ) -> Result<&GridFileRecord, FileError> {
        self.record
            .get_or_try_init(|| async {
                let record = store
                    .find_file(path)
                    .await?
                    .ok_or_else(|| FileError::NotFound(path.to_string()))?;
                tracing::debug!(
                    path,
                    length = record.length,
                    chunk_size = record.chunk_size,
                    "loaded file record"
                );
                Ok::<_, FileError>(record)
            })
            .await
    }

    /// Replace the record and drop the cached chunk.
    pub fn set_record(&mut self, record: GridFileRecord) {
        self.record = OnceCell::new_with(Some(record));
        self.cache.get_mut().clear();
    }

    /// Forget the record and the cached chunk; the next read reloads both.
    pub fn reset(&mut self) {
        self.record.take();
        self.cache.get_mut().clear();
    }

    pub async fn cached_chunk(&self) -> Option<u64> {
        self.cache.lock().await.cached_index()
    }

    /// Fill `buf` from the file starting at `offset`.
    ///
    /// Returns the number of bytes copied: 0 past the end of the file,
    /// fewer than `buf.len()` when the file ends first.
    pub async fn read(
        &self,
        path: &str,
        store: &dyn GridStore,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<usize, FileError> {
        let record = self.record(path, store).await?;
        let length = record.length;
        let chunk_size = record.chunk_size;

        if offset > length {
            tracing::info!(path, offset, length, "read offset beyond end of file");
            return Ok(0);
        }

        let size = buf.len();
        let mut read_so_far = 0usize;
        while read_so_far < size {
            let position = offset + read_so_far as u64;
            if position >= length {
                break;
            }

            let chunk_n = position / chunk_size;
            let chunk_offset = position % chunk_size;
            let step = ((size - read_so_far) as u64)
                .min(length - position)
                .min(chunk_size - chunk_offset) as usize;

            read_so_far += self
                .read_chunk(
                    path,
                    store,
                    record,
                    &mut buf[read_so_far..read_so_far + step],
                    chunk_n,
                    chunk_offset,
                )
                .await?;
        }

        Ok(read_so_far)
    }

    /// Copy `out.len()` bytes from chunk `chunk_n` at `chunk_offset`.
    ///
    /// The cache lock is held across the fetch and the copy, so the bytes
    /// always come from the chunk the cache reports.
    async fn read_chunk(
        &self,
        path: &str,
        store: &dyn GridStore,
        record: &GridFileRecord,
        out: &mut [u8],
        chunk_n: u64,
        chunk_offset: u64,
    ) -> Result<usize, FileError> {
        let size = out.len();
        let mut cache = self.cache.lock().await;

        debug_assert!(record.chunk_size > 0);
        debug_assert!(chunk_offset + size as u64 <= record.chunk_size);
        debug_assert!(chunk_n * record.chunk_size + chunk_offset + size as u64 <= record.length);

        cache.fetch(store, record, chunk_n).await?;
        let bytes = cache
            .bytes(chunk_offset as usize, size)
            .ok_or_else(|| FileError::ShortChunk {
                path: path.to_string(),
                n: chunk_n,
                len: cache.cached_len(),
            })?;
        out.copy_from_slice(bytes);
        Ok(size)
    }
}
