pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pod")]
#[command(about = "A Solid pod server")]
pub struct Args {
    /// Path to the pod config directory (defaults to ~/.pod)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
