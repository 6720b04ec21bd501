//! Simulate command: an in-process multi-rank training loop.
//!
//! Each rank runs on its own thread with its own compute and comm queues,
//! joined through a [`LocalGroup`]. Rank `r` produces gradients of
//! `(r + 1) * scale` on every trainable element, so after the mean
//! reduction every rank applies the same `(world_size + 1) / 2` gradient.
//! Injected overflow is written by rank 0 only and reaches every other rank
//! through the reduction, which keeps the per-rank scalers in lockstep.

use std::sync::Arc;
use std::thread::ScopedJoinHandle;

use chrono::Utc;
use tracing::{debug, info};

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::collective::{Collective, LocalCollective, LocalGroup};
use crate::config::{
    check_overflow_steps, load_spec, validate_spec, DataParallelConfig, RunSpec, SimulateArgs,
};
use crate::coordinator::DataParallelBuilder;
use crate::error::{panic_message, Error, Result};
use crate::optim::ScaledSgd;
use crate::params::{Buffer, ParameterStore};
use crate::scaler::{GradScaler, ScalerState};
use crate::trace::{JsonTraceWriter, TraceRecord, TraceSink};

/// Knobs that may differ from the run spec
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOptions {
    pub steps: usize,
    pub profiling: bool,
    /// Scaler snapshot restored on every rank before the first step
    pub resume: Option<ScalerState>,
}

impl SimulationOptions {
    pub fn from_spec(spec: &RunSpec) -> Self {
        Self { steps: spec.simulation.steps, profiling: spec.data_parallel.profiling, resume: None }
    }
}

/// Outcome of one rank's loop
#[derive(Debug, Clone)]
pub struct RankReport {
    pub rank: usize,
    /// Loss scale in effect at each step, before its update
    pub scale_history: Vec<f32>,
    pub final_scale: f32,
    pub scaler_state: Option<ScalerState>,
    pub steps_applied: usize,
    pub steps_skipped: usize,
    /// Final parameter values, in insertion order
    pub parameters: Vec<(String, Vec<f32>)>,
    pub records: Vec<TraceRecord>,
}

/// Per-rank outcomes, ordered by rank
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub ranks: Vec<RankReport>,
}

impl SimulationReport {
    pub fn lead(&self) -> Option<&RankReport> {
        self.ranks.first()
    }

    /// Trace records from every rank
    pub fn records(&self) -> Vec<TraceRecord> {
        self.ranks.iter().flat_map(|r| r.records.iter().cloned()).collect()
    }
}

/// Run `options.steps` steps on `world_size` threads and collect each rank's outcome.
pub fn run_simulation(spec: &RunSpec, options: &SimulationOptions) -> Result<SimulationReport> {
    validate_spec(spec)?;
    check_overflow_steps(&spec.simulation.overflow_steps, options.steps)?;
    let world_size = spec.data_parallel.world_size;
    let collectives = LocalGroup::new(world_size)?;
    let origin_us = Utc::now().timestamp_micros() as f64;
    info!(world_size, steps = options.steps, "starting simulation");

    let ranks = std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(world_size);
        for collective in collectives {
            let rank = collective.rank();
            let handle = std::thread::Builder::new()
                .name(format!("rank-{rank}"))
                .spawn_scoped(scope, move || run_rank(spec, options, collective, origin_us))
                .map_err(|e| Error::io(format!("spawning rank {rank}"), e))?;
            handles.push(handle);
        }
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| join_rank(rank, handle))
            .collect::<Result<Vec<_>>>()
    })?;
    Ok(SimulationReport { ranks })
}

/// Join a rank thread, reporting a panic as a failure of that rank.
pub(crate) fn join_rank<T>(rank: usize, handle: ScopedJoinHandle<'_, Result<T>>) -> Result<T> {
    handle
        .join()
        .map_err(|payload| Error::RankPanicked { rank, message: panic_message(payload.as_ref()) })?
}

fn run_rank(
    spec: &RunSpec,
    options: &SimulationOptions,
    collective: LocalCollective,
    origin_us: f64,
) -> Result<RankReport> {
    let rank = collective.rank();
    let sim = &spec.simulation;
    let config = DataParallelConfig {
        rank,
        profiling: options.profiling,
        ..spec.data_parallel.clone()
    };

    let mut store = ParameterStore::new();
    for param in &sim.parameters {
        let p = store.add(param.name.clone(), vec![0.0; param.numel])?;
        if param.requires_grad {
            p.ensure_grad();
        }
    }

    let optimizer = ScaledSgd::new(store.as_slice().to_vec(), sim.learning_rate)
        .with_grad_divisor(config.world_size);
    let mut dp = DataParallelBuilder::new(config)
        .parameters(&store)
        .collective(Arc::new(collective))
        .optimizer(optimizer)
        .build()?;

    // Resolved after build: flattening rebinds every gradient to its view.
    let trainable: Vec<Buffer> = sim
        .parameters
        .iter()
        .filter(|p| p.requires_grad)
        .filter_map(|p| store.get(&p.name).and_then(|param| param.grad()))
        .collect();

    let mut scaler = GradScaler::from_config(&spec.scaler)?;
    if let Some(state) = &options.resume {
        scaler.load_state_dict(state)?;
    }

    dp.mark_time_origin(origin_us)?;
    let mut records = Vec::new();
    let mut scale_history = Vec::with_capacity(options.steps);

    for step in 1..=options.steps {
        let scale = scaler.scale();
        scale_history.push(scale);
        dp.with_optimizer(|opt| opt.set_inv_scale(scaler.inv_scale()));

        let overflow = rank == 0 && sim.overflow_steps.contains(&step);
        let value = if overflow { f32::INFINITY } else { (rank + 1) as f32 * scale };
        let grads = trainable.clone();
        dp.compute_queue().enqueue("backward", move || {
            for grad in &grads {
                grad.fill(value);
            }
            Ok(())
        })?;

        let backward_done = dp.mark_backward_done()?;
        let timeline = dp.step(&backward_done)?;
        timeline.synchronize()?;
        records.extend(dp.profile_step(&timeline)?);

        let found_inf = dp.with_optimizer(|opt| opt.found_inf());
        scaler.update(found_inf);
        debug!(rank, step, scale, found_inf, "step complete");
    }

    let (steps_applied, steps_skipped) =
        dp.with_optimizer(|opt| (opt.steps_applied(), opt.steps_skipped()));
    Ok(RankReport {
        rank,
        scale_history,
        final_scale: scaler.scale(),
        scaler_state: scaler.state_dict(),
        steps_applied,
        steps_skipped,
        parameters: store.iter().map(|p| (p.name().to_string(), p.data().to_vec())).collect(),
        records,
    })
}

pub fn run_simulate(args: SimulateArgs, level: LogLevel) -> Result<()> {
    log(level, LogLevel::Normal, &format!("gradsync: simulating {}", args.config.display()));

    let spec = load_spec(&args.config)?;
    let mut options = SimulationOptions::from_spec(&spec);
    if let Some(steps) = args.steps {
        options.steps = steps;
    }
    options.profiling |= args.trace.is_some();
    if let Some(path) = &args.resume {
        let state = ScalerState::load_json(path)?;
        log(
            level,
            LogLevel::Verbose,
            &format!("  Resuming scaler at scale {} from {}", state.scale, path.display()),
        );
        options.resume = Some(state);
    }

    let report = run_simulation(&spec, &options)?;
    let Some(lead) = report.lead() else {
        return Ok(());
    };
    log(
        level,
        LogLevel::Normal,
        &format!(
            "Simulation complete: {} ranks, {} steps applied, {} skipped, final scale {}",
            report.ranks.len(),
            lead.steps_applied,
            lead.steps_skipped,
            lead.final_scale
        ),
    );

    if let Some(path) = &args.trace {
        let mut writer = JsonTraceWriter::new(path);
        writer.emit_all(report.records())?;
        let written = writer.finish()?;
        log(level, LogLevel::Normal, &format!("Trace: {written} records to {}", path.display()));
    }

    if let Some(path) = &args.checkpoint {
        match &lead.scaler_state {
            Some(state) => {
                state.save_json(path)?;
                log(level, LogLevel::Normal, &format!("Scaler state saved to {}", path.display()));
            }
            None => log(level, LogLevel::Normal, "Constant scaler: no checkpoint written"),
        }
    }
    Ok(())
}
