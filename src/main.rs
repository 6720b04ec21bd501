//! gradsync CLI
//!
//! # Usage
//!
//! ```bash
//! # Validate a run spec
//! gradsync validate run.yaml
//!
//! # Simulate a multi-rank run with a Chrome trace and scaler checkpoint
//! gradsync simulate run.yaml --trace trace.json --checkpoint scaler.json
//!
//! # Resume the scaler from a checkpoint
//! gradsync simulate run.yaml --resume scaler.json --steps 100
//! ```

use clap::Parser;
use gradsync::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
