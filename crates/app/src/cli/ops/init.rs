use clap::Args;

use gridfuse::config::{AppState, Config};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Chunk size in bytes for newly written files (default: 255 KiB)
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] gridfuse::config::ConfigError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = Config {
            log_dir: self.log_dir.clone(),
            ..Config::default()
        };
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let output = format!(
            "Initialized gridfuse directory at: {}\n\
             - Config: {}\n\
             - Database: {}\n\
             - Objects: {:?}\n\
             - Chunk size: {} bytes",
            state.dir.display(),
            state.config_path.display(),
            state.db_path().display(),
            state.objects(),
            state.config.chunk_size,
        );

        Ok(output)
    }
}
