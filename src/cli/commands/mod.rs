//! CLI command implementations

mod simulate;
mod validate;

#[cfg(test)]
mod tests;

pub use simulate::{run_simulation, RankReport, SimulationOptions, SimulationReport};

use crate::cli::{init_tracing, LogLevel};
use crate::config::{Cli, Command};
use crate::error::Result;

/// Execute a CLI command based on the parsed arguments
pub fn run_command(cli: Cli) -> Result<()> {
    let log_level = LogLevel::from_flags(cli.verbose, cli.quiet);
    init_tracing(log_level);

    match cli.command {
        Command::Validate(args) => validate::run_validate(args, log_level),
        Command::Simulate(args) => simulate::run_simulate(args, log_level),
    }
}
