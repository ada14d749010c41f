use clap::Parser;
use std::path::PathBuf;

/// Media repository server.
#[derive(Debug, Parser)]
#[command(name = "reelvault", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "reelvault.toml")]
    pub config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}
