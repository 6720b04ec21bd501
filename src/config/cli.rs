//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// gradsync: overlapped gradient reduction and dynamic loss scaling
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "gradsync")]
#[command(author = "PAIML")]
#[command(version)]
#[command(about = "Overlapped data-parallel gradient reduction with dynamic loss scaling")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Validate a configuration file
    Validate(ValidateArgs),

    /// Run a multi-rank simulated training loop in-process
    Simulate(SimulateArgs),
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}

/// Arguments for the simulate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct SimulateArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Write a Chrome trace (implies profiling)
    #[arg(short, long, value_name = "FILE")]
    pub trace: Option<PathBuf>,

    /// Save the final scaler state to this file
    #[arg(short, long, value_name = "FILE")]
    pub checkpoint: Option<PathBuf>,

    /// Resume the scaler from a saved state
    #[arg(short, long, value_name = "FILE")]
    pub resume: Option<PathBuf>,

    /// Override the number of steps
    #[arg(short, long)]
    pub steps: Option<usize>,
}

/// Parse arguments (testable entry point)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}
