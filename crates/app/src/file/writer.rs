//! Prefix-only write path over a staging region.

use super::error::FileError;
use super::staging::StagingRegion;

/// Write side of a file handle.
///
/// Accepts strictly sequential writes starting at offset 0. Bytes land in
/// a [`StagingRegion`] that grows one chunk at a time and is handed to the
/// store as a whole on commit.
#[derive(Debug)]
pub struct StagingWriter {
    written: u64,
    dirty: bool,
    region: StagingRegion,
}

impl StagingWriter {
    pub fn new(chunk_size: u64) -> Self {
        Self {
            written: 0,
            dirty: false,
            region: StagingRegion::new(chunk_size as usize),
        }
    }

    /// Bytes accepted so far, which is also the next valid write offset.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn capacity(&self) -> usize {
        self.region.capacity()
    }

    pub fn chunk_size(&self) -> usize {
        self.region.chunk_size()
    }

    /// Append `data` at `offset`, which must equal [`written`].
    ///
    /// [`written`]: StagingWriter::written
    pub fn write(&mut self, path: &str, data: &[u8], offset: u64) -> Result<usize, FileError> {
        if offset != self.written {
            return Err(FileError::NonPrefixWrite {
                path: path.to_string(),
                offset,
            });
        }

        let end = offset as usize + data.len();
        if !self.region.is_mapped() {
            self.region
                .initialize()
                .map_err(|source| Self::out_of_memory(path, source))?;
            tracing::debug!(path, capacity = self.region.capacity(), "mapped staging region");
        }
        while self.region.capacity() < end {
            self.region
                .extend()
                .map_err(|source| Self::out_of_memory(path, source))?;
            tracing::debug!(path, capacity = self.region.capacity(), "extended staging region");
        }

        self.region.as_mut_slice()[offset as usize..end].copy_from_slice(data);
        self.dirty = true;
        self.written += data.len() as u64;
        Ok(data.len())
    }

    fn out_of_memory(path: &str, source: std::io::Error) -> FileError {
        tracing::error!(path, error = %source, "failed to map staging memory");
        FileError::OutOfMemory {
            path: path.to_string(),
            source,
        }
    }

    /// The contiguous staged bytes `[0, written)`.
    pub fn staged(&self) -> &[u8] {
        &self.region.as_slice()[..self.written as usize]
    }

    /// Unmap the staging region and reset the counters.
    pub fn release(&mut self) {
        if self.region.is_mapped() {
            tracing::debug!(capacity = self.region.capacity(), "released staging region");
        }
        self.region.release();
        self.written = 0;
        self.dirty = false;
    }
}
