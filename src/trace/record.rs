//! Chrome trace-event records.

use serde::{Deserialize, Serialize};

/// Timeline row for gradient reductions
pub const COMM_THREAD_LABEL: &str = "7. optimizer-comm";

/// Timeline row for optimizer updates
pub const COMP_THREAD_LABEL: &str = "8. optimizer-comp";

/// Extra fields attached to a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceArgs {
    /// Parameter name or buffer label
    pub para: String,
    /// Element count
    pub size: usize,
}

/// One completed, timed interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub name: String,
    /// Always `"X"` (complete event)
    pub ph: String,
    /// Global rank
    pub pid: usize,
    pub tid: String,
    /// Start, µs since the shared origin
    pub ts: f64,
    /// Duration in µs
    pub dur: f64,
    /// Viewer colour name
    pub cname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<TraceArgs>,
}

impl TraceRecord {
    /// One gradient reduction interval
    pub fn allreduce(rank: usize, label: &str, numel: usize, ts: f64, dur: f64) -> Self {
        Self {
            name: "opt_allreduce".to_string(),
            ph: "X".to_string(),
            pid: rank,
            tid: COMM_THREAD_LABEL.to_string(),
            ts,
            dur,
            cname: "cq_build_passed".to_string(),
            args: Some(TraceArgs { para: label.to_string(), size: numel }),
        }
    }

    /// One optimizer update interval
    pub fn optimizer_step(rank: usize, numel: usize, ts: f64, dur: f64) -> Self {
        Self {
            name: "opt_comp".to_string(),
            ph: "X".to_string(),
            pid: rank,
            tid: COMP_THREAD_LABEL.to_string(),
            ts,
            dur,
            cname: "bad".to_string(),
            args: Some(TraceArgs { para: "optimizer".to_string(), size: numel }),
        }
    }
}
