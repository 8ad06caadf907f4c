use grid_store::GridStoreError;

/// Errors surfaced by an open grid file handle.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// The backing store cannot edit a blob in place, so writes must be
    /// strictly sequential from offset 0.
    #[error(
        "non-prefix write not supported: {path} at offset {offset} \
         (rewrite the whole file from offset 0)"
    )]
    NonPrefixWrite { path: String, offset: u64 },

    #[error("out of memory staging writes for {path}: {source}")]
    OutOfMemory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("file not open for writing: {0}")]
    ReadOnly(String),

    #[error("chunk {n} of {path} holds only {len} bytes")]
    ShortChunk { path: String, n: u64, len: usize },

    #[error(transparent)]
    Store(#[from] GridStoreError),
}

impl FileError {
    /// The errno a FUSE reply should carry for this error.
    pub fn errno(&self) -> libc::c_int {
        match self {
            FileError::NonPrefixWrite { .. } => libc::ENOTSUP,
            FileError::OutOfMemory { .. } => libc::ENOMEM,
            FileError::NotFound(_) => libc::ENOENT,
            FileError::ReadOnly(_) => libc::EBADF,
            FileError::ShortChunk { .. } => libc::EIO,
            FileError::Store(GridStoreError::NotFound(_)) => libc::ENOENT,
            FileError::Store(_) => libc::EIO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        let non_prefix = FileError::NonPrefixWrite {
            path: "/a".to_string(),
            offset: 10,
        };
        assert_eq!(non_prefix.errno(), libc::ENOTSUP);
        assert!(non_prefix.to_string().contains("/a"));
        assert!(non_prefix.to_string().contains("10"));

        let oom = FileError::OutOfMemory {
            path: "/a".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::OutOfMemory),
        };
        assert_eq!(oom.errno(), libc::ENOMEM);

        assert_eq!(FileError::NotFound("/a".into()).errno(), libc::ENOENT);
        assert_eq!(FileError::ReadOnly("/a".into()).errno(), libc::EBADF);
        assert_eq!(
            FileError::Store(GridStoreError::InvalidRecord("x".into())).errno(),
            libc::EIO
        );
    }
}
