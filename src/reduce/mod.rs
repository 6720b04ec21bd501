//! Gradient reduction on the communication queue.
//!
//! [`GradientReducer::reduce`] never blocks the host. It schedules, on the
//! communication queue:
//!
//! 1. a wait on the caller's backward-done point,
//! 2. one in-place sum allreduce per buffer (a single call in flattened
//!    mode), each bracketed by start/end sync points for tracing,
//! 3. a `reduction_done` point after the last reduction.
//!
//! Buffers are mutated in place and no averaging is applied; callers that
//! want a mean divide by the world size themselves.

use std::sync::Arc;

use tracing::{debug, info};

use crate::collective::Collective;
use crate::error::Result;
use crate::params::{Buffer, ParameterSet};
use crate::queue::{ExecutionQueue, SyncPoint};

/// Trace label for the single reduction in flattened mode
pub const FLATTENED_GRAD_LABEL: &str = "flattened_grad";

/// Timing bracket around one enqueued reduction
#[derive(Debug, Clone)]
pub struct ReduceInterval {
    /// Parameter name, or [`FLATTENED_GRAD_LABEL`]
    pub label: String,
    /// Elements reduced
    pub numel: usize,
    pub start: SyncPoint,
    pub end: SyncPoint,
}

/// Handles produced by one call to [`GradientReducer::reduce`]
#[derive(Debug, Clone)]
pub struct Reduction {
    /// Reached once every reduction of this call has completed
    pub done: SyncPoint,
    /// One entry per reduced buffer, in enqueue order
    pub intervals: Vec<ReduceInterval>,
}

/// Reduces a fixed parameter set across the data-parallel group.
pub struct GradientReducer {
    params: ParameterSet,
    collective: Arc<dyn Collective>,
}

impl GradientReducer {
    pub fn new(params: ParameterSet, collective: Arc<dyn Collective>) -> Self {
        let numel = params.total_numel();
        let element_size = std::mem::size_of::<f32>();
        info!(
            parameters = params.parameters().len(),
            numel,
            element_size,
            total_mb = numel * element_size / 1024 / 1024,
            flattened = params.is_flattened(),
            world_size = collective.world_size(),
            rank = collective.rank(),
            "gradient reducer ready"
        );
        Self { params, collective }
    }

    pub fn parameter_set(&self) -> &ParameterSet {
        &self.params
    }

    pub fn collective(&self) -> &Arc<dyn Collective> {
        &self.collective
    }

    /// Schedule the reduction of every gradient after `backward_done`.
    ///
    /// In per-parameter mode, gradient presence is decided here, at enqueue
    /// time; parameters without a gradient are skipped.
    pub fn reduce(&self, comm: &ExecutionQueue, backward_done: &SyncPoint) -> Result<Reduction> {
        comm.wait(backward_done)?;

        let mut intervals = Vec::new();
        match &self.params {
            ParameterSet::Flattened { grad, .. } => {
                intervals.push(self.enqueue_allreduce(comm, FLATTENED_GRAD_LABEL, grad.clone())?);
            }
            ParameterSet::PerParameter(params) => {
                for param in params {
                    let Some(grad) = param.grad() else {
                        debug!(parameter = param.name(), "no gradient, skipping reduction");
                        continue;
                    };
                    intervals.push(self.enqueue_allreduce(comm, param.name(), grad)?);
                }
            }
        }

        let done = comm.record_new()?;
        Ok(Reduction { done, intervals })
    }

    fn enqueue_allreduce(
        &self,
        comm: &ExecutionQueue,
        label: &str,
        grad: Buffer,
    ) -> Result<ReduceInterval> {
        let numel = grad.numel();
        let start = comm.record_new()?;
        let collective = Arc::clone(&self.collective);
        comm.enqueue(format!("allreduce:{label}"), move || {
            grad.write(|values| collective.allreduce_sum(values))
        })?;
        let end = comm.record_new()?;
        Ok(ReduceInterval { label: label.to_string(), numel, start, end })
    }
}
