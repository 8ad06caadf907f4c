//! Error types for the grid store.

use crate::FileId;

/// Errors that can occur when working with the grid store.
#[derive(Debug, thiserror::Error)]
pub enum GridStoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Object storage error
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// File record not found
    #[error("file not found: {0}")]
    NotFound(String),

    /// A record references a chunk object that is not in storage
    #[error("chunk {n} of file {file_id} not found in storage")]
    ChunkNotFound { file_id: FileId, n: u64 },

    /// A stored record cannot be interpreted
    #[error("invalid file record: {0}")]
    InvalidRecord(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// S3 bucket not found - must be created before use
    #[error("S3 bucket '{0}' does not exist. Create it before mounting.")]
    BucketNotFound(String),
}

/// Result type alias for grid store operations.
pub type Result<T> = std::result::Result<T, GridStoreError>;
