//! Trace records for an external timeline viewer.
//!
//! Queue timings are host-observable only as elapsed time between two
//! completed sync points. Given one reference point whose wall-clock time is
//! known, any other completed point maps onto the same clock:
//!
//! `timestamp(X) = reference_timestamp + elapsed(reference, X)`
//!
//! Records use the Chrome trace-event "complete" (`ph: "X"`) form, with
//! timestamps and durations in microseconds.

mod record;
mod sink;

pub use record::{TraceArgs, TraceRecord, COMM_THREAD_LABEL, COMP_THREAD_LABEL};
pub use sink::{JsonTraceWriter, MemoryTraceSink, TraceSink};

use crate::error::Result;
use crate::queue::SyncPoint;

/// Wall-clock anchor for deriving absolute timestamps from sync points.
#[derive(Debug, Clone)]
pub struct TimeOrigin {
    reference: SyncPoint,
    wall_clock_us: f64,
}

impl TimeOrigin {
    /// `reference` must be recorded; its completion is awaited lazily.
    pub fn new(reference: SyncPoint, wall_clock_us: f64) -> Self {
        Self { reference, wall_clock_us }
    }

    pub fn reference(&self) -> &SyncPoint {
        &self.reference
    }

    pub fn wall_clock_us(&self) -> f64 {
        self.wall_clock_us
    }

    /// Absolute timestamp (µs) of a completed point.
    pub fn timestamp_us(&self, point: &SyncPoint) -> Result<f64> {
        Ok(self.wall_clock_us + self.reference.elapsed_micros(point)?)
    }
}
