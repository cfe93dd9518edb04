use std::path::PathBuf;

use clap::Parser;

use crate::Commands;

/// Main CLI application arguments and command structure
#[derive(Parser, Debug)]
#[clap(
    version,
    about = "Export, search and map the notes of a flomo account"
)]
pub struct Cli {
    /// Path to the configuration file
    #[clap(short = 'c', long, value_parser)]
    pub config: Option<PathBuf>,

    /// Authorization header value, overrides the configured token
    #[clap(long, env = "FLOMO_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Verbose output mode
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands for the flomokit application
    #[clap(subcommand)]
    pub command: Commands,
}
