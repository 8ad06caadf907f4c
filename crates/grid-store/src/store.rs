//! The store interface the file handles are written against.

use async_trait::async_trait;

use crate::error::Result;
use crate::record::{Chunk, FileId, GridFileRecord};

/// Chunked file store.
///
/// A file version is an immutable series of `chunk_size` wide chunks plus
/// one metadata record. Content is replaced by storing a new version,
/// never edited in place; the only in-place edit is [`GridStore::set_length`].
#[async_trait]
pub trait GridStore: Send + Sync {
    /// Newest record stored under `filename`.
    async fn find_file(&self, filename: &str) -> Result<Option<GridFileRecord>>;

    /// Fetch chunk `n` of a stored file.
    async fn fetch_chunk(&self, file: &GridFileRecord, n: u64) -> Result<Chunk>;

    /// Store `data` as a new version of `filename`.
    async fn store_file(
        &self,
        filename: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<GridFileRecord>;

    /// Overwrite the length field of the record identified by `id`.
    async fn set_length(&self, id: &FileId, length: u64) -> Result<()>;

    /// Newest record of every stored filename.
    async fn list_files(&self) -> Result<Vec<GridFileRecord>>;

    /// Remove every version of `filename`. Returns false if none existed.
    async fn remove_file(&self, filename: &str) -> Result<bool>;
}
