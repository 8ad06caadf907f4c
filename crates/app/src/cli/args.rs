pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gridfuse")]
#[command(about = "Mount a chunked grid file store as a local filesystem")]
pub struct Args {
    /// Path to the gridfuse config directory (defaults to ~/.gridfuse)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
