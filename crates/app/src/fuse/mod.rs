//! FUSE filesystem implementation for gridfuse
//!
//! Mounts a grid store as a local directory. Files are read through the
//! chunk cache and written as whole new versions on flush.

pub mod cache;
pub mod grid_fuse;
pub mod inode_table;

pub use cache::MetadataCache;
pub use grid_fuse::{GridFuse, GridFuseConfig};
pub use inode_table::InodeTable;
