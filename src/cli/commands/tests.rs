//! CLI command tests

use super::*;
use crate::config::*;
use crate::scaler::ScalerState;
use approx::assert_relative_eq;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SPEC: &str = r#"
data_parallel:
  world_size: 2
scaler:
  initial_scale: 65536
  hysteresis: 1
simulation:
  steps: 3
  learning_rate: 0.1
  parameters:
    - { name: w, numel: 4 }
    - { name: b, numel: 2, requires_grad: false }
"#;

fn write_config(dir: &TempDir, yaml: &str) -> PathBuf {
    let path = dir.path().join("run.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

fn param<'a>(report: &'a RankReport, name: &str) -> &'a [f32] {
    &report.parameters.iter().find(|(n, _)| n == name).unwrap().1
}

fn quiet_cli(args: &[&str]) -> Cli {
    let mut full = vec!["gradsync"];
    full.extend_from_slice(args);
    full.push("-q");
    parse_args(full).unwrap()
}

#[test]
fn test_simulation_ranks_agree() {
    let spec = parse_spec(SPEC).unwrap();
    let report = run_simulation(&spec, &SimulationOptions::from_spec(&spec)).unwrap();

    assert_eq!(report.ranks.len(), 2);
    for rank in &report.ranks {
        assert_eq!(rank.steps_applied, 3);
        // mean gradient (1 + 2) / 2 = 1.5, three steps at lr 0.1
        for &v in param(rank, "w") {
            assert_relative_eq!(v, -0.45, epsilon = 1e-5);
        }
        assert_eq!(param(rank, "b"), &[0.0, 0.0]);
    }
    assert_eq!(report.ranks[0].parameters, report.ranks[1].parameters);
}

#[test]
fn test_simulation_per_parameter_matches_flattened() {
    let flat = parse_spec(SPEC).unwrap();
    let mut per_param = flat.clone();
    per_param.data_parallel.flatten = false;

    let a = run_simulation(&flat, &SimulationOptions::from_spec(&flat)).unwrap();
    let b = run_simulation(&per_param, &SimulationOptions::from_spec(&per_param)).unwrap();
    assert_eq!(a.ranks[0].parameters, b.ranks[0].parameters);
}

#[test]
fn test_simulation_overflow_backs_off_on_every_rank() {
    let mut spec = parse_spec(SPEC).unwrap();
    spec.simulation.overflow_steps = vec![2];
    let report = run_simulation(&spec, &SimulationOptions::from_spec(&spec)).unwrap();

    for rank in &report.ranks {
        assert_eq!(rank.scale_history, vec![65536.0, 65536.0, 32768.0]);
        assert_eq!(rank.steps_skipped, 1);
        assert_eq!(rank.steps_applied, 2);
        assert_relative_eq!(param(rank, "w")[0], -0.3, epsilon = 1e-5);
    }
}

#[test]
fn test_simulation_profiling_records() {
    let spec = parse_spec(SPEC).unwrap();
    let options = SimulationOptions { profiling: true, ..SimulationOptions::from_spec(&spec) };
    let report = run_simulation(&spec, &options).unwrap();

    // one flattened reduction and one update per step, per rank
    assert_eq!(report.records().len(), 2 * 3 * 2);
    let pids: Vec<usize> = report.ranks[1].records.iter().map(|r| r.pid).collect();
    assert!(pids.iter().all(|&pid| pid == 1));
}

#[test]
fn test_simulation_resume() {
    let spec = parse_spec(SPEC).unwrap();
    let options = SimulationOptions {
        resume: Some(ScalerState { scale: 1024.0, growth_tracker: 0, hysteresis_tracker: 1 }),
        ..SimulationOptions::from_spec(&spec)
    };
    let report = run_simulation(&spec, &options).unwrap();
    assert_eq!(report.lead().unwrap().scale_history[0], 1024.0);
}

#[test]
fn test_simulation_rejects_invalid_resume() {
    let spec = parse_spec(SPEC).unwrap();
    let options = SimulationOptions {
        resume: Some(ScalerState { scale: 0.5, growth_tracker: 0, hysteresis_tracker: 1 }),
        ..SimulationOptions::from_spec(&spec)
    };
    assert!(matches!(
        run_simulation(&spec, &options),
        Err(crate::error::Error::InvalidCheckpoint(_))
    ));
}

#[test]
fn test_simulation_rejects_overflow_past_step_override() {
    let mut spec = parse_spec(SPEC).unwrap();
    spec.simulation.overflow_steps = vec![3];
    let options = SimulationOptions { steps: 2, ..SimulationOptions::from_spec(&spec) };
    assert!(matches!(
        run_simulation(&spec, &options),
        Err(crate::error::Error::InvalidConfig { field: "simulation.overflow_steps", .. })
    ));
}

#[test]
fn test_run_simulate_steps_override_checks_overflow_steps() {
    let dir = TempDir::new().unwrap();
    let yaml = SPEC.replace("  steps: 3\n", "  steps: 3\n  overflow_steps: [3]\n");
    let config = write_config(&dir, &yaml);
    let cli = quiet_cli(&["simulate", config.to_str().unwrap(), "--steps", "2"]);
    let err = run_command(cli).unwrap_err();
    assert!(err.to_string().contains("overflow_steps"));
}

#[test]
fn test_panicked_rank_is_reported_by_rank() {
    let result: crate::error::Result<()> = std::thread::scope(|scope| {
        let handle = scope.spawn(|| -> crate::error::Result<()> { panic!("rank state lost") });
        simulate::join_rank(3, handle)
    });
    match result {
        Err(crate::error::Error::RankPanicked { rank, message }) => {
            assert_eq!(rank, 3);
            assert_eq!(message, "rank state lost");
        }
        other => panic!("expected RankPanicked, got {other:?}"),
    }
}

#[test]
fn test_run_validate_command() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, SPEC);
    let cli = quiet_cli(&["validate", config.to_str().unwrap()]);
    assert!(run_command(cli).is_ok());
}

#[test]
fn test_run_validate_rejects_bad_config() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "data_parallel:\n  world_size: 0\n");
    let cli = quiet_cli(&["validate", config.to_str().unwrap()]);
    assert!(run_command(cli).is_err());
}

#[test]
fn test_run_simulate_writes_outputs() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, SPEC);
    let trace = dir.path().join("trace.json");
    let checkpoint = dir.path().join("scaler.json");
    let cli = quiet_cli(&[
        "simulate",
        config.to_str().unwrap(),
        "--trace",
        trace.to_str().unwrap(),
        "--checkpoint",
        checkpoint.to_str().unwrap(),
        "--steps",
        "2",
    ]);
    run_command(cli).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&trace).unwrap()).unwrap();
    assert_eq!(json["traceEvents"].as_array().unwrap().len(), 2 * 2 * 2);

    let state = ScalerState::load_json(&checkpoint).unwrap();
    assert_eq!(state.scale, 65536.0);
    assert_eq!(state.growth_tracker, 2);
}

#[test]
fn test_run_simulate_resumes_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, SPEC);
    let resume = dir.path().join("resume.json");
    ScalerState { scale: 512.0, growth_tracker: 1, hysteresis_tracker: 1 }
        .save_json(&resume)
        .unwrap();
    let checkpoint = dir.path().join("out.json");
    let cli = quiet_cli(&[
        "simulate",
        config.to_str().unwrap(),
        "--resume",
        resume.to_str().unwrap(),
        "--checkpoint",
        checkpoint.to_str().unwrap(),
    ]);
    run_command(cli).unwrap();
    assert_eq!(ScalerState::load_json(&checkpoint).unwrap().growth_tracker, 4);
}

#[test]
fn test_run_simulate_constant_scaler_skips_checkpoint() {
    let dir = TempDir::new().unwrap();
    let yaml = SPEC.replace("  initial_scale: 65536\n  hysteresis: 1\n", "  kind: constant\n  initial_scale: 8\n");
    let config = write_config(&dir, &yaml);
    let checkpoint = dir.path().join("scaler.json");
    let cli = quiet_cli(&[
        "simulate",
        config.to_str().unwrap(),
        "--checkpoint",
        checkpoint.to_str().unwrap(),
    ]);
    run_command(cli).unwrap();
    assert!(!Path::new(&checkpoint).exists());
}

#[test]
fn test_run_simulate_missing_config() {
    let cli = quiet_cli(&["simulate", "/nonexistent/run.yaml"]);
    assert!(run_command(cli).is_err());
}
