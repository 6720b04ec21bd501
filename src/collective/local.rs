//! In-process rendezvous collective for ranks running as threads.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use super::Collective;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct GroupInner {
    arrived: usize,
    generation: u64,
    contributions: Vec<Option<Vec<f32>>>,
    result: Vec<f32>,
    error: Option<String>,
}

#[derive(Debug)]
struct GroupState {
    world_size: usize,
    inner: Mutex<GroupInner>,
    condvar: Condvar,
}

impl GroupState {
    fn lock(&self) -> MutexGuard<'_, GroupInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Factory for a group of in-process ranks sharing one rendezvous.
pub struct LocalGroup;

impl LocalGroup {
    /// Create one handle per rank. Hand each to its own thread.
    pub fn new(world_size: usize) -> Result<Vec<LocalCollective>> {
        if world_size == 0 {
            return Err(Error::config("world_size", "must be positive, got 0"));
        }
        let state = Arc::new(GroupState {
            world_size,
            inner: Mutex::new(GroupInner {
                contributions: vec![None; world_size],
                ..GroupInner::default()
            }),
            condvar: Condvar::new(),
        });
        Ok((0..world_size)
            .map(|rank| LocalCollective { rank, state: Arc::clone(&state) })
            .collect())
    }
}

/// One rank's handle onto a [`LocalGroup`].
///
/// Every rank must call [`allreduce_sum`](Collective::allreduce_sum) the same
/// number of times with equally sized buffers. Contributions are summed in
/// rank order, so all ranks observe a bit-identical result.
#[derive(Debug)]
pub struct LocalCollective {
    rank: usize,
    state: Arc<GroupState>,
}

impl Collective for LocalCollective {
    fn allreduce_sum(&self, buf: &mut [f32]) -> Result<()> {
        let state = &self.state;
        let mut inner = state.lock();
        if let Some(message) = &inner.error {
            return Err(Error::Collective(message.clone()));
        }

        let generation = inner.generation;
        inner.contributions[self.rank] = Some(buf.to_vec());
        inner.arrived += 1;

        if inner.arrived == state.world_size {
            let contributions: Vec<Vec<f32>> =
                inner.contributions.iter_mut().filter_map(Option::take).collect();
            let len = buf.len();
            if let Some(bad) = contributions.iter().find(|c| c.len() != len) {
                let message =
                    format!("buffer length mismatch: expected {len}, got {}", bad.len());
                inner.error = Some(message.clone());
                inner.generation += 1;
                state.condvar.notify_all();
                return Err(Error::Collective(message));
            }

            let mut sum = vec![0.0f32; len];
            for contribution in &contributions {
                for (acc, v) in sum.iter_mut().zip(contribution) {
                    *acc += v;
                }
            }
            inner.result = sum;
            inner.arrived = 0;
            inner.generation += 1;
            state.condvar.notify_all();
        } else {
            while inner.generation == generation {
                inner = state.condvar.wait(inner).unwrap_or_else(PoisonError::into_inner);
            }
            if let Some(message) = &inner.error {
                return Err(Error::Collective(message.clone()));
            }
        }

        // Ranks of the next generation cannot complete until this rank
        // arrives, so the result is still intact here.
        buf.copy_from_slice(&inner.result);
        Ok(())
    }

    fn world_size(&self) -> usize {
        self.state.world_size
    }

    fn rank(&self) -> usize {
        self.rank
    }
}
