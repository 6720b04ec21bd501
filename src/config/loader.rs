//! Loading and validating run specifications

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use super::RunSpec;
use crate::error::{Error, Result};

/// Read, parse and validate a YAML run specification.
pub fn load_spec(path: impl AsRef<Path>) -> Result<RunSpec> {
    let path = path.as_ref();
    let yaml = fs::read_to_string(path)
        .map_err(|e| Error::io(format!("reading config {}", path.display()), e))?;
    let spec = parse_spec(&yaml).map_err(|e| match e {
        Error::Yaml { source, .. } => Error::Yaml { path: path.to_path_buf(), source },
        other => other,
    })?;
    Ok(spec)
}

/// Parse and validate YAML text.
pub fn parse_spec(yaml: &str) -> Result<RunSpec> {
    let spec: RunSpec = serde_yaml::from_str(yaml)
        .map_err(|source| Error::Yaml { path: "<inline>".into(), source })?;
    validate_spec(&spec)?;
    Ok(spec)
}

/// Check every section of a run specification.
pub fn validate_spec(spec: &RunSpec) -> Result<()> {
    spec.data_parallel.validate()?;
    spec.scaler.validate()?;

    let sim = &spec.simulation;
    if !(sim.learning_rate.is_finite() && sim.learning_rate > 0.0) {
        return Err(Error::config(
            "simulation.learning_rate",
            format!("must be finite and > 0, got {}", sim.learning_rate),
        ));
    }
    let mut seen = HashSet::new();
    for param in &sim.parameters {
        if !seen.insert(param.name.as_str()) {
            return Err(Error::DuplicateParameter(param.name.clone()));
        }
    }
    check_overflow_steps(&sim.overflow_steps, sim.steps)
}

/// Every injected overflow step must fall inside `1..=steps`.
pub fn check_overflow_steps(overflow_steps: &[usize], steps: usize) -> Result<()> {
    if let Some(step) = overflow_steps.iter().find(|&&s| s == 0 || s > steps) {
        return Err(Error::config(
            "simulation.overflow_steps",
            format!("step {step} is outside 1..={steps}"),
        ));
    }
    Ok(())
}
