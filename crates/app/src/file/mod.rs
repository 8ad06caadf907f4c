//! Per-file handle over the chunked grid store
//!
//! A [`GridFile`] mediates all byte-level traffic for one open path:
//! reads splice chunk-aligned slices out of a one-slot [`ChunkCache`],
//! writes append into an anonymous [`StagingRegion`] that is committed to
//! the store as a whole new file version.

mod chunk_cache;
mod entry;
mod error;
mod reader;
mod staging;
mod writer;

pub use chunk_cache::ChunkCache;
pub use entry::{GridFile, UpdateListener};
pub use error::FileError;
pub use reader::ChunkReader;
pub use staging::StagingRegion;
pub use writer::StagingWriter;
