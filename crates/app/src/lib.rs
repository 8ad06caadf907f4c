// Library exports for the CLI binary and integration tests

pub mod config;
pub mod file;
pub mod fuse;
pub mod logging;

// Re-export key types for convenience
pub use config::{AppState, Config, ConfigError};
pub use file::{FileError, GridFile, UpdateListener};
pub use fuse::{GridFuse, GridFuseConfig};
