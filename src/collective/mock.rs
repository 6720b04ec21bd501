//! Single-process stand-in for a multi-rank group.

use std::sync::{Arc, Mutex, PoisonError};

use super::Collective;
use crate::error::{Error, Result};

/// Record of a single allreduce invocation (for test assertions).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllreduceCall {
    pub rank: usize,
    pub len: usize,
}

/// Simulates identical ranks: the sum is `value * world_size`.
///
/// Every call is logged so tests can assert on the number and size of
/// reductions. Clones share the log.
#[derive(Clone, Debug)]
pub struct MockCollective {
    rank: usize,
    world_size: usize,
    call_log: Arc<Mutex<Vec<AllreduceCall>>>,
    fail_after: Option<usize>,
}

impl MockCollective {
    pub fn new(rank: usize, world_size: usize) -> Self {
        Self { rank, world_size, call_log: Arc::default(), fail_after: None }
    }

    /// Fail every call after the first `calls` succeed
    pub fn with_failure_after(mut self, calls: usize) -> Self {
        self.fail_after = Some(calls);
        self
    }

    /// Calls made so far
    pub fn call_log(&self) -> Vec<AllreduceCall> {
        self.call_log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear_log(&self) {
        self.call_log.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Collective for MockCollective {
    fn allreduce_sum(&self, buf: &mut [f32]) -> Result<()> {
        let mut log = self.call_log.lock().unwrap_or_else(PoisonError::into_inner);
        if self.fail_after.is_some_and(|limit| log.len() >= limit) {
            return Err(Error::Collective(format!(
                "simulated failure on rank {} after {} calls",
                self.rank,
                log.len()
            )));
        }
        log.push(AllreduceCall { rank: self.rank, len: buf.len() });
        let world = self.world_size as f32;
        for v in buf.iter_mut() {
            *v *= world;
        }
        Ok(())
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn rank(&self) -> usize {
        self.rank
    }
}
