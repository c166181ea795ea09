//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::Parser;

pub use crate::commands::inspect::InspectArgs;

/// imgspect - Inspect container images in a registry without pulling them
#[derive(Parser, Debug)]
#[command(name = "imgspect")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to a config file (default: <config dir>/imgspect/config.yaml)
    #[arg(short, long)]
    pub config: Option<Utf8PathBuf>,

    #[command(flatten)]
    pub inspect: InspectArgs,
}
