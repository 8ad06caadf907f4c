//! One-slot cache of the most recently fetched chunk.

use grid_store::{Chunk, GridFileRecord, GridStore, Result};

/// Holds at most one chunk. A fetch of a different index evicts it.
///
/// Index and bytes live in the same `Chunk`, so replacing the slot swaps
/// both at once. Callers guard the cache with a mutex for the whole
/// fetch-and-copy of a single-chunk read.
#[derive(Debug, Default)]
pub struct ChunkCache {
    slot: Option<Chunk>,
}

impl ChunkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the cached chunk, `None` when empty.
    pub fn cached_index(&self) -> Option<u64> {
        self.slot.as_ref().map(Chunk::index)
    }

    /// Make chunk `n` of `file` the cached chunk.
    ///
    /// A no-op when it already is. On a failed fetch the previous chunk
    /// stays cached.
    pub async fn fetch(&mut self, store: &dyn GridStore, file: &GridFileRecord, n: u64) -> Result<()> {
        if self.cached_index() == Some(n) {
            return Ok(());
        }

        tracing::debug!(
            filename = %file.filename,
            chunk = n,
            evicted = ?self.cached_index(),
            "chunk cache miss"
        );
        let chunk = store.fetch_chunk(file, n).await?;
        self.slot = Some(chunk);
        Ok(())
    }

    /// `size` bytes at `offset` within the cached chunk.
    ///
    /// `None` when the cache is empty or the chunk is too short.
    pub fn bytes(&self, offset: usize, size: usize) -> Option<&[u8]> {
        let chunk = self.slot.as_ref()?;
        let end = offset.checked_add(size)?;
        chunk.data().get(offset..end)
    }

    /// Length of the cached chunk, 0 when empty.
    pub fn cached_len(&self) -> usize {
        self.slot.as_ref().map_or(0, Chunk::len)
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }
}
