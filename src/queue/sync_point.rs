//! One-shot completion markers that order work across execution queues.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::error::{Error, Result};

static NEXT_POINT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide completion counter, shared by every queue.
static COMPLETION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Where and when a sync point was reached by its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Host clock reading at the moment the queue reached the point
    pub instant: Instant,
    /// 1-based op index within the owning queue
    pub position: u64,
    /// Monotonic across all queues: a point reached after observing another
    /// point always carries a larger sequence number
    pub sequence: u64,
}

#[derive(Debug, Clone)]
enum PointState {
    Created,
    Pending,
    Completed(Completion),
    Faulted(String),
}

#[derive(Debug)]
struct PointInner {
    id: u64,
    queue_id: u64,
    queue_label: Arc<str>,
    state: Mutex<PointState>,
    reached: Condvar,
}

/// A recordable, waitable marker bound to one [`ExecutionQueue`](super::ExecutionQueue).
///
/// Cloning yields another handle to the same marker.
#[derive(Debug, Clone)]
pub struct SyncPoint {
    inner: Arc<PointInner>,
}

impl SyncPoint {
    pub(crate) fn new(queue_id: u64, queue_label: Arc<str>) -> Self {
        Self {
            inner: Arc::new(PointInner {
                id: NEXT_POINT_ID.fetch_add(1, Ordering::Relaxed),
                queue_id,
                queue_label,
                state: Mutex::new(PointState::Created),
                reached: Condvar::new(),
            }),
        }
    }

    /// Unique id of this marker
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Id of the queue the marker is bound to
    pub fn queue_id(&self) -> u64 {
        self.inner.queue_id
    }

    /// Label of the queue the marker is bound to
    pub fn queue_label(&self) -> &str {
        &self.inner.queue_label
    }

    /// Whether a record has been issued (the queue may not have reached it yet)
    pub fn is_recorded(&self) -> bool {
        !matches!(*self.lock(), PointState::Created)
    }

    /// Whether the owning queue has executed the record
    pub fn is_complete(&self) -> bool {
        matches!(*self.lock(), PointState::Completed(_))
    }

    /// Completion details, if the queue has reached this point
    pub fn completion(&self) -> Option<Completion> {
        match *self.lock() {
            PointState::Completed(c) => Some(c),
            _ => None,
        }
    }

    /// Block the host until the owning queue reaches this point.
    ///
    /// Fails fast on an unrecorded point and surfaces queue faults.
    pub fn synchronize(&self) -> Result<Completion> {
        let mut state = self.lock();
        loop {
            match &*state {
                PointState::Created => {
                    return Err(Error::UnrecordedSyncPoint {
                        point: self.id(),
                        queue: self.queue_label().to_string(),
                    })
                }
                PointState::Pending => {
                    state = self.inner.reached.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                PointState::Completed(c) => return Ok(*c),
                PointState::Faulted(message) => {
                    return Err(Error::QueueFaulted {
                        queue: self.queue_label().to_string(),
                        message: message.clone(),
                    })
                }
            }
        }
    }

    /// Signed microseconds from `self` to `end`; both must have completed.
    pub fn elapsed_micros(&self, end: &SyncPoint) -> Result<f64> {
        let start = self.completion().ok_or(Error::SyncPointNotCompleted(self.id()))?;
        let stop = end.completion().ok_or(Error::SyncPointNotCompleted(end.id()))?;
        Ok(if stop.instant >= start.instant {
            stop.instant.duration_since(start.instant).as_secs_f64() * 1e6
        } else {
            -(start.instant.duration_since(stop.instant).as_secs_f64() * 1e6)
        })
    }

    pub(crate) fn mark_pending(&self) -> Result<()> {
        let mut state = self.lock();
        match *state {
            PointState::Created => {
                *state = PointState::Pending;
                Ok(())
            }
            _ => Err(Error::SyncPointAlreadyRecorded(self.id())),
        }
    }

    pub(crate) fn complete(&self, position: u64) {
        let mut state = self.lock();
        *state = PointState::Completed(Completion {
            instant: Instant::now(),
            position,
            sequence: COMPLETION_SEQUENCE.fetch_add(1, Ordering::SeqCst),
        });
        self.inner.reached.notify_all();
    }

    pub(crate) fn fault(&self, message: String) {
        let mut state = self.lock();
        *state = PointState::Faulted(message);
        self.inner.reached.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, PointState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for SyncPoint {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for SyncPoint {}
