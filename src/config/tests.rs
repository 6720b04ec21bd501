//! Tests for configuration loading and CLI parsing.

use std::path::PathBuf;

use super::*;
use crate::error::Error;
use crate::scaler::ScalerKind;

const FULL_SPEC: &str = r#"
data_parallel:
  world_size: 4
  rank: 2
  flatten: "false"
  profiling: true
scaler:
  kind: dynamic
  initial_scale: 1024
  min_scale: 2
  growth_factor: 2
  backoff_factor: 0.5
  growth_interval: 3
  hysteresis: 2
simulation:
  steps: 12
  learning_rate: 0.1
  parameters:
    - { name: embed.weight, numel: 64 }
    - { name: head.bias, numel: 4, requires_grad: false }
  overflow_steps: [4, 5]
"#;

#[test]
fn test_parse_full_spec() {
    let spec = parse_spec(FULL_SPEC).unwrap();
    assert_eq!(spec.data_parallel.world_size, 4);
    assert_eq!(spec.data_parallel.rank, 2);
    assert!(!spec.data_parallel.flatten);
    assert!(spec.data_parallel.profiling);
    assert_eq!(spec.scaler.kind, ScalerKind::Dynamic);
    assert_eq!(spec.scaler.initial_scale, 1024.0);
    assert_eq!(spec.scaler.growth_interval, 3);
    assert_eq!(spec.simulation.steps, 12);
    assert_eq!(spec.simulation.parameters.len(), 2);
    assert!(!spec.simulation.parameters[1].requires_grad);
    assert_eq!(spec.simulation.overflow_steps, vec![4, 5]);
}

#[test]
fn test_defaults_apply() {
    let spec = parse_spec("simulation:\n  parameters: []\n").unwrap();
    assert_eq!(spec.data_parallel, DataParallelConfig::default());
    assert!(spec.data_parallel.flatten);
    assert_eq!(spec.scaler.initial_scale, 65536.0);
    assert_eq!(spec.simulation.steps, 10);
}

#[test]
fn test_rejects_bad_lenient_bool() {
    let err = parse_spec("data_parallel:\n  flatten: \"maybe\"\n").unwrap_err();
    assert!(matches!(err, Error::Yaml { .. }));
}

#[test]
fn test_rejects_rank_outside_world() {
    let err = parse_spec("data_parallel:\n  world_size: 2\n  rank: 2\n").unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { field: "rank", .. }));
}

#[test]
fn test_rejects_invalid_scaler() {
    let err = parse_spec("scaler:\n  backoff_factor: 1.5\n").unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { field: "backoff_factor", .. }));
}

#[test]
fn test_rejects_duplicate_parameter_names() {
    let yaml = "simulation:\n  parameters:\n    - { name: w, numel: 1 }\n    - { name: w, numel: 2 }\n";
    assert!(matches!(parse_spec(yaml), Err(Error::DuplicateParameter(_))));
}

#[test]
fn test_rejects_overflow_step_out_of_range() {
    let yaml = "simulation:\n  steps: 3\n  parameters: []\n  overflow_steps: [4]\n";
    let err = parse_spec(yaml).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { field: "simulation.overflow_steps", .. }));
}

#[test]
fn test_load_spec_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.yaml");
    std::fs::write(&path, FULL_SPEC).unwrap();
    assert_eq!(load_spec(&path).unwrap().data_parallel.world_size, 4);
}

#[test]
fn test_load_spec_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "data_parallel: [").unwrap();
    match load_spec(&path).unwrap_err() {
        Error::Yaml { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("expected Yaml error, got {other:?}"),
    }
}

#[test]
fn test_load_spec_missing_file() {
    assert!(matches!(load_spec("/nonexistent/run.yaml"), Err(Error::Io { .. })));
}

#[test]
fn test_parse_validate_command() {
    let cli = parse_args(["gradsync", "validate", "run.yaml"]).unwrap();
    match cli.command {
        Command::Validate(args) => assert_eq!(args.config, PathBuf::from("run.yaml")),
        _ => panic!("Expected Validate command"),
    }
    assert!(!cli.verbose);
}

#[test]
fn test_parse_simulate_with_options() {
    let cli = parse_args([
        "gradsync",
        "simulate",
        "run.yaml",
        "--trace",
        "trace.json",
        "--checkpoint",
        "scaler.json",
        "--steps",
        "5",
        "-v",
    ])
    .unwrap();
    assert!(cli.verbose);
    match cli.command {
        Command::Simulate(args) => {
            assert_eq!(args.trace, Some(PathBuf::from("trace.json")));
            assert_eq!(args.checkpoint, Some(PathBuf::from("scaler.json")));
            assert_eq!(args.resume, None);
            assert_eq!(args.steps, Some(5));
        }
        _ => panic!("Expected Simulate command"),
    }
}

#[test]
fn test_parse_requires_config() {
    assert!(parse_args(["gradsync", "simulate"]).is_err());
}
