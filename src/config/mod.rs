//! Declarative configuration and CLI parsing
//!
//! ```yaml
//! data_parallel:
//!   world_size: 4
//!   flatten: true
//!   profiling: true
//! scaler:
//!   kind: dynamic
//!   initial_scale: 65536
//!   min_scale: 1
//!   growth_factor: 2
//!   backoff_factor: 0.5
//!   growth_interval: 1000
//!   hysteresis: 2
//! simulation:
//!   steps: 20
//!   parameters:
//!     - { name: embed.weight, numel: 4096 }
//!     - { name: head.bias, numel: 16, requires_grad: false }
//!   overflow_steps: [5, 6]
//! ```

mod cli;
mod loader;
mod schema;

#[cfg(test)]
mod tests;

pub use cli::{parse_args, Cli, Command, SimulateArgs, ValidateArgs};
pub use loader::{check_overflow_steps, load_spec, parse_spec, validate_spec};
pub use schema::{DataParallelConfig, ParameterSpec, RunSpec, SimulationSpec};
