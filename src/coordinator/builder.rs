//! Builder that refuses to construct a coordinator with missing collaborators.

use std::sync::{Arc, Mutex};

use super::AllReduceDataParallel;
use crate::collective::Collective;
use crate::config::DataParallelConfig;
use crate::error::{Error, Result};
use crate::optim::Optimizer;
use crate::params::{ParameterSet, ParameterStore};
use crate::queue::{ExecutionQueue, QueuePriority};
use crate::reduce::GradientReducer;

/// Assembles an [`AllReduceDataParallel`].
///
/// `build()` fails if the parameter set, collective or optimizer is missing,
/// or if the collective disagrees with the configured group.
pub struct DataParallelBuilder<O: Optimizer + 'static> {
    config: DataParallelConfig,
    params: Option<ParameterSet>,
    collective: Option<Arc<dyn Collective>>,
    optimizer: Option<O>,
}

impl<O: Optimizer + 'static> DataParallelBuilder<O> {
    pub fn new(config: DataParallelConfig) -> Self {
        Self { config, params: None, collective: None, optimizer: None }
    }

    /// Use an explicit parameter set
    pub fn parameter_set(mut self, params: ParameterSet) -> Self {
        self.params = Some(params);
        self
    }

    /// Build the parameter set from a store, in the mode `config.flatten` selects
    pub fn parameters(self, store: &ParameterStore) -> Self {
        let params = if self.config.flatten {
            ParameterSet::flattened(store)
        } else {
            ParameterSet::per_parameter(store)
        };
        self.parameter_set(params)
    }

    pub fn collective(mut self, collective: Arc<dyn Collective>) -> Self {
        self.collective = Some(collective);
        self
    }

    pub fn optimizer(mut self, optimizer: O) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn build(self) -> Result<AllReduceDataParallel<O>> {
        self.config.validate()?;
        let params = self.params.ok_or(Error::MissingCollaborator("parameter set"))?;
        let collective = self.collective.ok_or(Error::MissingCollaborator("collective"))?;
        let optimizer = self.optimizer.ok_or(Error::MissingCollaborator("optimizer"))?;

        if collective.world_size() != self.config.world_size {
            return Err(Error::WorldSizeMismatch {
                expected: self.config.world_size,
                actual: collective.world_size(),
            });
        }
        if collective.rank() != self.config.rank {
            return Err(Error::RankMismatch {
                expected: self.config.rank,
                actual: collective.rank(),
            });
        }

        let rank = self.config.rank;
        Ok(AllReduceDataParallel {
            compute: ExecutionQueue::new(format!("compute-{rank}"), QueuePriority::Normal)?,
            comm: ExecutionQueue::new(format!("dp-comm-{rank}"), QueuePriority::High)?,
            reducer: GradientReducer::new(params, collective),
            optimizer: Arc::new(Mutex::new(optimizer)),
            time_origin: None,
            config: self.config,
        })
    }
}
