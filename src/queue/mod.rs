//! Asynchronous execution queues and the sync points that order them.
//!
//! Each [`ExecutionQueue`] drives one worker thread standing in for a
//! hardware execution context. Operations on one queue run strictly in
//! enqueue order; distinct queues progress independently unless a
//! [`SyncPoint`] recorded on one is waited on by the other.
//!
//! Issuing `enqueue`, `record` or `wait` never blocks the host. Only
//! [`SyncPoint::synchronize`] and [`ExecutionQueue::synchronize`] do.
//!
//! ## Faults
//!
//! A task returning `Err` or panicking poisons its queue: later tasks and waits are
//! skipped, and later records resolve as faulted so that any other queue
//! waiting on them faults as well instead of hanging.

mod sync_point;


pub use sync_point::{Completion, SyncPoint};

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{panic_message, Error, Result};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// Scheduling priority requested for a queue's execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuePriority {
    /// Regular compute work
    #[default]
    Normal,
    /// Latency-sensitive traffic such as gradient communication
    High,
}

impl fmt::Display for QueuePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueuePriority::Normal => write!(f, "normal"),
            QueuePriority::High => write!(f, "high"),
        }
    }
}

type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

enum Op {
    Run { label: String, task: Task },
    Wait(SyncPoint),
    Record(SyncPoint),
}

#[derive(Default)]
struct QueueShared {
    fault: Mutex<Option<String>>,
}

impl QueueShared {
    fn fault(&self) -> Option<String> {
        self.fault.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_fault(&self, message: String) {
        let mut fault = self.fault.lock().unwrap_or_else(PoisonError::into_inner);
        if fault.is_none() {
            *fault = Some(message);
        }
    }
}

/// An ordered, asynchronous sequence of operations bound to one worker.
pub struct ExecutionQueue {
    id: u64,
    label: Arc<str>,
    priority: QueuePriority,
    sender: Option<Sender<Op>>,
    shared: Arc<QueueShared>,
    worker: Option<JoinHandle<()>>,
}

impl ExecutionQueue {
    /// Spawn a queue with its own worker thread.
    pub fn new(label: impl Into<String>, priority: QueuePriority) -> Result<Self> {
        let label: Arc<str> = Arc::from(label.into());
        let (sender, receiver) = mpsc::channel();
        let shared = Arc::new(QueueShared::default());

        let worker = thread::Builder::new()
            .name(format!("queue-{label}"))
            .spawn({
                let label = Arc::clone(&label);
                let shared = Arc::clone(&shared);
                move || run_worker(&label, &receiver, &shared)
            })
            .map_err(|e| Error::io(format!("spawning worker for queue '{label}'"), e))?;

        Ok(Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            label,
            priority,
            sender: Some(sender),
            shared,
            worker: Some(worker),
        })
    }

    /// Unique id of this queue
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Human-readable label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Priority the queue was created with
    pub fn priority(&self) -> QueuePriority {
        self.priority
    }

    /// Fault message if a task on this queue has failed
    pub fn fault(&self) -> Option<String> {
        self.shared.fault()
    }

    /// Create an unrecorded sync point bound to this queue.
    pub fn create_sync_point(&self) -> SyncPoint {
        SyncPoint::new(self.id, Arc::clone(&self.label))
    }

    /// Enqueue a task. Returns immediately.
    pub fn enqueue<F>(&self, label: impl Into<String>, task: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let label = label.into();
        debug!(queue = %self.label, op = %label, "enqueue");
        self.send(Op::Run { label, task: Box::new(task) })
    }

    /// Stamp `point` at the current tail of this queue.
    pub fn record(&self, point: &SyncPoint) -> Result<()> {
        if point.queue_id() != self.id {
            return Err(Error::SyncPointQueueMismatch {
                point: point.id(),
                expected: point.queue_label().to_string(),
                actual: self.label.to_string(),
            });
        }
        point.mark_pending()?;
        if let Err(e) = self.send(Op::Record(point.clone())) {
            point.fault(e.to_string());
            return Err(e);
        }
        Ok(())
    }

    /// Create a sync point and record it at the current tail.
    pub fn record_new(&self) -> Result<SyncPoint> {
        let point = self.create_sync_point();
        self.record(&point)?;
        Ok(point)
    }

    /// Make this queue block until `point` has been reached by its own queue.
    ///
    /// The point must already be recorded; waiting on an unrecorded point is
    /// rejected here rather than left to hang the queue.
    pub fn wait(&self, point: &SyncPoint) -> Result<()> {
        if !point.is_recorded() {
            return Err(Error::UnrecordedSyncPoint {
                point: point.id(),
                queue: point.queue_label().to_string(),
            });
        }
        debug!(queue = %self.label, point = point.id(), on = point.queue_label(), "wait");
        self.send(Op::Wait(point.clone()))
    }

    /// Block the host until everything enqueued so far has executed.
    pub fn synchronize(&self) -> Result<()> {
        self.record_new()?.synchronize().map(|_| ())
    }

    fn send(&self, op: Op) -> Result<()> {
        let sender = self.sender.as_ref().ok_or_else(|| self.faulted("queue is shut down"))?;
        sender.send(op).map_err(|_| self.faulted("worker thread exited"))
    }

    fn faulted(&self, message: &str) -> Error {
        Error::QueueFaulted {
            queue: self.label.to_string(),
            message: self.fault().unwrap_or_else(|| message.to_string()),
        }
    }
}

impl fmt::Debug for ExecutionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionQueue")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("priority", &self.priority)
            .field("fault", &self.fault())
            .finish()
    }
}

impl Drop for ExecutionQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is left and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if let Err(payload) = worker.join() {
                error!(
                    queue = %self.label,
                    panic = %panic_message(payload.as_ref()),
                    "queue worker exited abnormally"
                );
            }
        }
    }
}

fn run_worker(label: &str, receiver: &Receiver<Op>, shared: &QueueShared) {
    let mut position = 0u64;
    for op in receiver {
        position += 1;
        let fault = shared.fault();
        match op {
            Op::Run { label: op_label, task } => {
                if fault.is_some() {
                    debug!(queue = label, op = %op_label, "skipped on faulted queue");
                    continue;
                }
                match panic::catch_unwind(AssertUnwindSafe(task)) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!(queue = label, op = %op_label, error = %e, "queue task failed");
                        shared.set_fault(format!("{op_label}: {e}"));
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!(queue = label, op = %op_label, panic = %message, "queue task panicked");
                        shared.set_fault(format!("{op_label}: panicked: {message}"));
                    }
                }
            }
            Op::Wait(point) => {
                if fault.is_some() {
                    continue;
                }
                if let Err(e) = point.synchronize() {
                    error!(queue = label, point = point.id(), error = %e, "cross-queue wait failed");
                    shared.set_fault(format!("waiting on sync point #{}: {e}", point.id()));
                }
            }
            Op::Record(point) => match fault {
                None => point.complete(position),
                Some(message) => point.fault(message),
            },
        }
    }
}
