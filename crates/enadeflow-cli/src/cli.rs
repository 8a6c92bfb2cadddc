//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "enadeflow", about = "Survey microdata batch pipeline", version)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "enadeflow.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute a single pipeline run and exit.
    Run,

    /// Run on the configured interval until interrupted.
    Serve,

    /// Print the task graph and exit.
    Tasks,
}
