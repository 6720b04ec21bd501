//! Validate command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{load_spec, RunSpec, ValidateArgs};
use crate::error::Result;
use crate::scaler::ScalerKind;

/// Format data-parallel group information as a string
pub fn format_group_info(spec: &RunSpec) -> String {
    let dp = &spec.data_parallel;
    format!(
        "  World size: {}\n  Flattened reduction: {}\n  Profiling: {}",
        dp.world_size, dp.flatten, dp.profiling
    )
}

/// Format loss-scaler configuration as a string
pub fn format_scaler_info(spec: &RunSpec) -> String {
    let scaler = &spec.scaler;
    let mut lines = vec![
        format!("  Scaler: {}", scaler.kind),
        format!("  Initial scale: {}", scaler.initial_scale),
    ];
    if scaler.kind == ScalerKind::Dynamic {
        lines.push(format!("  Min scale: {}", scaler.min_scale));
        lines.push(format!(
            "  Growth: x{} every {} steps",
            scaler.growth_factor, scaler.growth_interval
        ));
        lines.push(format!(
            "  Backoff: x{} after {} overflow(s)",
            scaler.backoff_factor, scaler.hysteresis
        ));
    }
    lines.join("\n")
}

/// Format the simulated workload as a string
pub fn format_simulation_info(spec: &RunSpec) -> String {
    let sim = &spec.simulation;
    let numel: usize = sim.parameters.iter().map(|p| p.numel).sum();
    let mut lines = vec![
        format!("  Steps: {}", sim.steps),
        format!("  Learning rate: {}", sim.learning_rate),
        format!("  Parameters: {} ({numel} elements)", sim.parameters.len()),
    ];
    let frozen = sim.parameters.iter().filter(|p| !p.requires_grad).count();
    if frozen > 0 {
        lines.push(format!("  Without gradient: {frozen}"));
    }
    if !sim.overflow_steps.is_empty() {
        lines.push(format!("  Injected overflow at steps: {:?}", sim.overflow_steps));
    }
    lines.join("\n")
}

/// Print detailed configuration summary
pub fn print_summary(spec: &RunSpec) {
    println!();
    println!("Configuration Summary:");
    println!("{}", format_group_info(spec));
    println!();
    println!("{}", format_scaler_info(spec));
    println!();
    println!("{}", format_simulation_info(spec));
}

pub fn run_validate(args: ValidateArgs, level: LogLevel) -> Result<()> {
    log(level, LogLevel::Normal, &format!("Validating config: {}", args.config.display()));

    let spec = load_spec(&args.config)?;

    log(level, LogLevel::Normal, "Configuration is valid");
    if level == LogLevel::Verbose {
        print_summary(&spec);
    }
    Ok(())
}
