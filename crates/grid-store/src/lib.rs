//! Chunked grid file store
//!
//! This crate stores files the way a document database "grid" does: every
//! file version is a metadata record plus an ordered series of fixed-size,
//! immutable chunks. Records live in SQLite; chunk bytes live in pluggable
//! object storage (S3/MinIO/local filesystem/memory).
//!
//! # Features
//!
//! - Versioned files: storing a filename again adds a newer version
//! - Metadata-only length updates on an existing record
//! - Multiple storage backends: S3, MinIO, local filesystem, in-memory
//!
//! # Example
//!
//! ```rust,no_run
//! use grid_store::{GridFs, GridStore};
//!
//! # async fn example() -> Result<(), grid_store::GridStoreError> {
//! let fs = GridFs::new_ephemeral(grid_store::DEFAULT_CHUNK_SIZE).await?;
//! fs.store_file("/notes.txt", b"hello", "text/plain").await?;
//! let record = fs.find_file("/notes.txt").await?.expect("just stored");
//! assert_eq!(record.length, 5);
//! # Ok(())
//! # }
//! ```

mod database;
mod error;
mod grid_fs;
mod record;
mod storage;
mod store;

pub use error::{GridStoreError, Result};
pub use grid_fs::{GridFs, DEFAULT_CHUNK_SIZE};
pub use record::{Chunk, FileId, GridFileRecord};
pub use storage::ObjectStoreConfig;
pub use store::GridStore;
