//! CLI module for gradsync
//!
//! This module contains the command handlers and output utilities.

mod commands;
mod logging;

pub use commands::{run_command, run_simulation, RankReport, SimulationOptions, SimulationReport};
pub use logging::{init_tracing, LogLevel};

// Re-export Cli from config for convenience
pub use crate::config::Cli;
