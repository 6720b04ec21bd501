//! Optimizers applied on the compute queue after reduction

mod optimizer;
mod sgd;

pub use optimizer::Optimizer;
pub use sgd::ScaledSgd;
