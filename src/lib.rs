//! gradsync: overlapped data-parallel gradient reduction with dynamic loss scaling
//!
//! Gradient reduction runs on its own communication queue, overlapped with
//! the compute queue, and the optimizer update is ordered after it through
//! sync points rather than host blocking. A dynamic loss-scale controller
//! adapts the fp16 loss scale from per-step overflow observations.
//!
//! # Architecture
//!
//! - [`queue`]: FIFO execution queues and one-shot sync points
//! - [`params`]: parameters, aliasing gradient buffers, flattening
//! - [`collective`]: allreduce collaborators (in-process group, mock)
//! - [`reduce`]: gradient reduction manager
//! - [`coordinator`]: reduction-then-update step sequencing
//! - [`scaler`]: constant and dynamic loss-scale controllers
//! - [`optim`]: optimizer collaborator and loss-scale aware SGD
//! - [`trace`]: Chrome trace records and timestamp derivation
//! - [`config`]: YAML run specs and CLI arguments
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use gradsync::collective::MockCollective;
//! use gradsync::config::DataParallelConfig;
//! use gradsync::coordinator::DataParallelBuilder;
//! use gradsync::optim::ScaledSgd;
//! use gradsync::params::ParameterStore;
//!
//! let mut store = ParameterStore::new();
//! let w = store.add("w", vec![1.0; 4]).unwrap();
//! w.ensure_grad();
//!
//! let dp = DataParallelBuilder::new(DataParallelConfig::new(2, 0))
//!     .parameters(&store)
//!     .collective(Arc::new(MockCollective::new(0, 2)))
//!     .optimizer(ScaledSgd::new(store.as_slice().to_vec(), 0.5).with_grad_divisor(2))
//!     .build()
//!     .unwrap();
//!
//! let grad = w.grad().unwrap();
//! dp.compute_queue()
//!     .enqueue("backward", move || {
//!         grad.fill(1.0);
//!         Ok(())
//!     })
//!     .unwrap();
//! let backward_done = dp.mark_backward_done().unwrap();
//! dp.step(&backward_done).unwrap().synchronize().unwrap();
//! assert_eq!(w.data().to_vec(), vec![0.5; 4]);
//! ```

pub mod cli;
pub mod collective;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod optim;
pub mod params;
pub mod queue;
pub mod reduce;
pub mod scaler;
pub mod trace;

pub use coordinator::{AllReduceDataParallel, DataParallelBuilder, StepTimeline};
pub use error::{Error, Result};
pub use queue::{ExecutionQueue, QueuePriority, SyncPoint};
pub use scaler::{GradScaler, ScalerConfig, ScalerState};
