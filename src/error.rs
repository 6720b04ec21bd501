//! Error types with actionable diagnostics.
//!
//! Every failure propagates to the immediate caller of the violated
//! operation. Nothing in this crate retries or recovers internally.

use std::any::Any;
use std::path::PathBuf;
use thiserror::Error;

/// Render a caught panic payload for error messages.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Result type alias for gradsync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by queues, reducers, scalers and the coordinator.
#[derive(Error, Debug)]
pub enum Error {
    /// A construction precondition was violated.
    #[error("Invalid configuration value for '{field}': {message}")]
    InvalidConfig { field: &'static str, message: String },

    /// A required collaborator was never supplied to a builder.
    #[error("Missing required collaborator: {0}\n  → Supply it before calling build()")]
    MissingCollaborator(&'static str),

    /// A queue was asked to wait on a sync point nobody recorded.
    #[error("Sync point #{point} (queue '{queue}') was waited on before being recorded")]
    UnrecordedSyncPoint { point: u64, queue: String },

    /// A sync point was recorded on a queue other than the one it is bound to.
    #[error("Sync point #{point} belongs to queue '{expected}', cannot record it on '{actual}'")]
    SyncPointQueueMismatch { point: u64, expected: String, actual: String },

    /// Sync points are one-shot.
    #[error("Sync point #{0} has already been recorded")]
    SyncPointAlreadyRecorded(u64),

    /// Timing was requested for a point the queue has not reached yet.
    #[error("Sync point #{0} has not completed; synchronize before reading its timing")]
    SyncPointNotCompleted(u64),

    /// A task on the queue failed; the queue is poisoned for the rest of the run.
    #[error("Execution queue '{queue}' faulted: {message}")]
    QueueFaulted { queue: String, message: String },

    /// The collective-communication backend failed.
    #[error("Collective operation failed: {0}")]
    Collective(String),

    /// A simulated rank thread died without returning a result.
    #[error("Rank {rank} thread panicked: {message}")]
    RankPanicked { rank: usize, message: String },

    /// The optimizer failed to apply its update.
    #[error("Optimizer update failed: {0}")]
    Optimizer(String),

    /// Parameter names must be unique within a store.
    #[error("Duplicate parameter name: {0}")]
    DuplicateParameter(String),

    /// The collective and the configuration disagree about the group.
    #[error("World size mismatch: config expects {expected}, collective reports {actual}")]
    WorldSizeMismatch { expected: usize, actual: usize },

    /// The collective and the configuration disagree about this rank.
    #[error("Rank mismatch: config expects rank {expected}, collective reports {actual}")]
    RankMismatch { expected: usize, actual: usize },

    /// A scaler checkpoint could not be applied.
    #[error("Invalid scaler checkpoint: {0}")]
    InvalidCheckpoint(String),

    /// Trace timestamps were requested before a reference point was set.
    #[error("No time origin set\n  → Call set_time_origin() with a recorded reference sync point first")]
    MissingTimeOrigin,

    /// IO error with context.
    #[error("IO error: {context}\n  Cause: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// YAML configuration could not be parsed.
    #[error("Invalid configuration syntax in {path}:\n  {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// JSON checkpoint or trace could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }

    /// Create a configuration error for `field`.
    pub fn config(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig { field, message: message.into() }
    }

    /// Whether the error stems from the calling sequence rather than a collaborator.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::UnrecordedSyncPoint { .. }
                | Self::SyncPointQueueMismatch { .. }
                | Self::SyncPointAlreadyRecorded(_)
                | Self::SyncPointNotCompleted(_)
                | Self::MissingTimeOrigin
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = Error::config("growth_factor", "must be > 1.0, got 0.5");
        let msg = err.to_string();
        assert!(msg.contains("growth_factor"));
        assert!(msg.contains("0.5"));
    }

    #[test]
    fn test_missing_collaborator_display() {
        let err = Error::MissingCollaborator("optimizer");
        assert!(err.to_string().contains("optimizer"));
    }

    #[test]
    fn test_contract_violation_classification() {
        assert!(Error::UnrecordedSyncPoint { point: 3, queue: "comm".into() }
            .is_contract_violation());
        assert!(Error::SyncPointAlreadyRecorded(1).is_contract_violation());
        assert!(!Error::Collective("nccl timeout".into()).is_contract_violation());
        assert!(!Error::MissingCollaborator("optimizer").is_contract_violation());
    }

    #[test]
    fn test_panic_message_payloads() {
        let caught = std::panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "static message");
        let caught = std::panic::catch_unwind(|| panic!("rank {}", 3)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "rank 3");
        let caught = std::panic::catch_unwind(|| std::panic::panic_any(7u8)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_rank_panicked_display() {
        let err = Error::RankPanicked { rank: 2, message: "boom".into() };
        let msg = err.to_string();
        assert!(msg.contains("Rank 2"));
        assert!(msg.contains("boom"));
        assert!(!msg.contains("Collective"));
    }

    #[test]
    fn test_io_error_keeps_source() {
        use std::error::Error as _;
        let err = Error::io(
            "reading config",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("reading config"));
        assert!(err.source().is_some());
    }
}
