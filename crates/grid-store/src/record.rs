//! File records and chunks as handed out by the store.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable object identifier of one stored file version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(Uuid);

impl FileId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Metadata record of one stored file version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridFileRecord {
    pub id: FileId,
    pub filename: String,
    /// Logical length in bytes
    pub length: u64,
    /// Width of every chunk but the last
    pub chunk_size: u64,
    pub content_type: String,
    /// Upload time, unix milliseconds
    pub upload_date: i64,
}

impl GridFileRecord {
    /// Number of chunks the record's content spans.
    pub fn chunk_count(&self) -> u64 {
        self.length.div_ceil(self.chunk_size)
    }
}

/// One immutable chunk of a stored file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    n: u64,
    data: Bytes,
}

impl Chunk {
    pub fn new(n: u64, data: Bytes) -> Self {
        Self { n, data }
    }

    /// Index of the chunk within its file.
    pub fn index(&self) -> u64 {
        self.n
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
