//! Reduction-then-update coordination across the compute and comm queues.
//!
//! One training step, once the caller has recorded `backward_done` on the
//! compute queue:
//!
//! ```text
//! compute: [backward ...] (backward_done) ·········· wait(reduction_done) (update_start) [update] (update_done)
//! comm:                   wait(backward_done) [allreduce ...] (reduction_done)
//! ```
//!
//! The update never starts before every reduction of its step has finished.
//! Nothing else is ordered: the comm queue may run a later step's traffic
//! while the compute queue is still applying this step's update, unless the
//! caller inserts its own sync point.

mod builder;


pub use builder::DataParallelBuilder;

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::config::DataParallelConfig;
use crate::error::{Error, Result};
use crate::optim::Optimizer;
use crate::queue::{ExecutionQueue, SyncPoint};
use crate::reduce::{GradientReducer, Reduction};
use crate::trace::{TimeOrigin, TraceRecord};

/// Every sync point involved in one step
#[derive(Debug, Clone)]
pub struct StepTimeline {
    pub backward_done: SyncPoint,
    pub reduction: Reduction,
    pub update_start: SyncPoint,
    pub update_done: SyncPoint,
}

impl StepTimeline {
    /// Block the host until the step's update has been applied.
    pub fn synchronize(&self) -> Result<()> {
        self.update_done.synchronize().map(|_| ())
    }
}

/// Owns the compute and communication queues for one training run.
pub struct AllReduceDataParallel<O: Optimizer + 'static> {
    config: DataParallelConfig,
    compute: ExecutionQueue,
    comm: ExecutionQueue,
    reducer: GradientReducer,
    optimizer: Arc<Mutex<O>>,
    time_origin: Option<TimeOrigin>,
}

impl<O: Optimizer + 'static> AllReduceDataParallel<O> {
    pub fn config(&self) -> &DataParallelConfig {
        &self.config
    }

    /// Queue for backward passes and optimizer updates
    pub fn compute_queue(&self) -> &ExecutionQueue {
        &self.compute
    }

    /// Queue for gradient reduction
    pub fn comm_queue(&self) -> &ExecutionQueue {
        &self.comm
    }

    pub fn reducer(&self) -> &GradientReducer {
        &self.reducer
    }

    /// Record a fresh point at the tail of the compute queue, marking the
    /// end of the backward work enqueued so far.
    pub fn mark_backward_done(&self) -> Result<SyncPoint> {
        self.compute.record_new()
    }

    /// Schedule reduction after `backward_done`, then the optimizer update
    /// after the reduction. Returns without waiting for either.
    pub fn step(&self, backward_done: &SyncPoint) -> Result<StepTimeline> {
        let reduction = self.reducer.reduce(&self.comm, backward_done)?;

        self.compute.wait(&reduction.done)?;
        let update_start = self.compute.record_new()?;
        let optimizer = Arc::clone(&self.optimizer);
        self.compute.enqueue("optimizer_step", move || {
            optimizer.lock().unwrap_or_else(PoisonError::into_inner).apply_update()
        })?;
        let update_done = self.compute.record_new()?;

        debug!(
            reductions = reduction.intervals.len(),
            update_done = update_done.id(),
            "step scheduled"
        );
        Ok(StepTimeline {
            backward_done: backward_done.clone(),
            reduction,
            update_start,
            update_done,
        })
    }

    /// Run `f` against the optimizer from the host.
    ///
    /// Blocks while an update is executing on the compute queue; synchronize
    /// the step first to read its results.
    pub fn with_optimizer<R>(&self, f: impl FnOnce(&mut O) -> R) -> R {
        f(&mut self.optimizer.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Anchor trace timestamps to a recorded point with known wall-clock time.
    pub fn set_time_origin(&mut self, reference: SyncPoint, wall_clock_us: f64) {
        self.time_origin = Some(TimeOrigin::new(reference, wall_clock_us));
    }

    /// Record a reference point on the compute queue and anchor it to
    /// `wall_clock_us`.
    pub fn mark_time_origin(&mut self, wall_clock_us: f64) -> Result<SyncPoint> {
        let reference = self.compute.record_new()?;
        self.set_time_origin(reference.clone(), wall_clock_us);
        Ok(reference)
    }

    /// Absolute timestamp (µs) of a completed point.
    pub fn timestamp_us(&self, point: &SyncPoint) -> Result<f64> {
        self.time_origin.as_ref().ok_or(Error::MissingTimeOrigin)?.timestamp_us(point)
    }

    /// Trace records for a finished step, or none when profiling is off.
    ///
    /// Waits for the step to complete before reading its timings.
    pub fn profile_step(&self, timeline: &StepTimeline) -> Result<Vec<TraceRecord>> {
        if !self.config.profiling {
            return Ok(Vec::new());
        }
        timeline.synchronize()?;
        let rank = self.config.rank;

        let mut records = Vec::with_capacity(timeline.reduction.intervals.len() + 1);
        for interval in &timeline.reduction.intervals {
            records.push(TraceRecord::allreduce(
                rank,
                &interval.label,
                interval.numel,
                self.timestamp_us(&interval.start)?,
                interval.start.elapsed_micros(&interval.end)?,
            ));
        }
        records.push(TraceRecord::optimizer_step(
            rank,
            self.reducer.parameter_set().total_numel(),
            self.timestamp_us(&timeline.update_start)?,
            timeline.update_start.elapsed_micros(&timeline.update_done)?,
        ));
        Ok(records)
    }
}
