//! Collective-communication backends.
//!
//! The reduction manager only needs one primitive: sum a contiguous buffer
//! in place across every rank of the data-parallel group. The call is made
//! from inside a communication-queue task, so it may block that queue (but
//! never the host).

mod local;
mod mock;

pub use local::{LocalCollective, LocalGroup};
pub use mock::{AllreduceCall, MockCollective};

use crate::error::Result;

/// Abstract allreduce backend.
pub trait Collective: Send + Sync {
    /// In-place sum allreduce: afterwards `buf` holds the element-wise sum
    /// over all ranks. No normalization is applied.
    fn allreduce_sum(&self, buf: &mut [f32]) -> Result<()>;

    /// Total number of ranks in the group.
    fn world_size(&self) -> usize;

    /// This rank's index (0-based).
    fn rank(&self) -> usize;
}
