use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use grid_store::{GridFs, GridStoreError};

use gridfuse::config::{AppState, ConfigError};
use gridfuse::fuse::{GridFuse, GridFuseConfig};
use gridfuse::logging::init_logging;

#[derive(Args, Debug, Clone)]
pub struct Mount {
    /// Directory to mount the grid store at
    #[arg(long)]
    pub mount_point: PathBuf,

    /// Reject every mutation with EROFS
    #[arg(long)]
    pub read_only: bool,

    /// Let users other than the mounting user access the filesystem
    #[arg(long)]
    pub allow_other: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] GridStoreError),

    #[error("mount point {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("failed to mount at {path}: {source}")]
    Mount {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("FUSE session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Mount {
    fn options(&self) -> Vec<fuser::MountOption> {
        let mut options = vec![
            fuser::MountOption::FSName("gridfuse".to_string()),
            fuser::MountOption::DefaultPermissions,
        ];
        if self.read_only {
            options.push(fuser::MountOption::RO);
        }
        if self.allow_other {
            options.push(fuser::MountOption::AllowOther);
            options.push(fuser::MountOption::AutoUnmount);
        }
        options
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Mount {
    type Error = MountError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let _guards = init_logging(
            state.config.log_level()?,
            state.config.log_dir.as_deref(),
        );

        if !self.mount_point.is_dir() {
            return Err(MountError::NotADirectory(self.mount_point.clone()));
        }

        let store = GridFs::new(&state.db_path(), state.objects(), state.config.chunk_size).await?;
        let fs = GridFuse::new(
            tokio::runtime::Handle::current(),
            Arc::new(store),
            GridFuseConfig {
                chunk_size: state.config.chunk_size,
                read_only: self.read_only,
                cache: state.config.cache.clone(),
            },
        );

        tracing::info!(
            mount_point = %self.mount_point.display(),
            read_only = self.read_only,
            "mounting grid store"
        );

        // The session blocks until unmount; FUSE callbacks drive the store with block_on
        let mount_point = self.mount_point.clone();
        let options = self.options();
        tokio::task::spawn_blocking(move || fuser::mount2(fs, &mount_point, &options))
            .await?
            .map_err(|source| MountError::Mount {
                path: self.mount_point.clone(),
                source,
            })?;

        tracing::info!(mount_point = %self.mount_point.display(), "unmounted");
        Ok(format!("Unmounted {}", self.mount_point.display()))
    }
}
