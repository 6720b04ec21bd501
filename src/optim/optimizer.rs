//! Optimizer trait

use crate::error::Result;

/// Trait for optimization algorithms driven by the coordinator.
///
/// `apply_update` runs as one opaque operation on the compute queue, after
/// every reduction of the step has completed. The optimizer holds handles
/// to the parameters it updates.
pub trait Optimizer: Send {
    /// Apply the accumulated (reduced) gradients
    fn apply_update(&mut self) -> Result<()>;
}

impl<F> Optimizer for F
where
    F: FnMut() -> Result<()> + Send,
{
    fn apply_update(&mut self) -> Result<()> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_optimizer() {
        let mut calls = 0;
        {
            let mut opt = || {
                calls += 1;
                Ok(())
            };
            opt.apply_update().unwrap();
            opt.apply_update().unwrap();
        }
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_boxed_optimizer() {
        let mut opt: Box<dyn Optimizer> = Box::new(|| -> Result<()> {
            Err(crate::error::Error::Optimizer("diverged".into()))
        });
        assert!(opt.apply_update().is_err());
    }
}
