//! Stochastic Gradient Descent with loss-scale awareness

use super::Optimizer;
use crate::error::{Error, Result};
use crate::params::Parameter;
use crate::scaler::unscale_and_check;

/// SGD that unscales reduced gradients before stepping.
///
/// Gradients arrive summed across ranks and multiplied by the loss scale.
/// Each update multiplies them by `inv_scale / grad_divisor`; if any value
/// is non-finite afterwards, the whole update is skipped and `found_inf`
/// is raised for the scale controller.
pub struct ScaledSgd {
    params: Vec<Parameter>,
    lr: f32,
    inv_scale: f32,
    grad_divisor: f32,
    found_inf: bool,
    steps_applied: usize,
    steps_skipped: usize,
}

impl ScaledSgd {
    /// Create a new SGD optimizer over `params`
    pub fn new(params: Vec<Parameter>, lr: f32) -> Self {
        Self {
            params,
            lr,
            inv_scale: 1.0,
            grad_divisor: 1.0,
            found_inf: false,
            steps_applied: 0,
            steps_skipped: 0,
        }
    }

    /// Divide reduced gradients by `divisor` (the world size, for a mean)
    pub fn with_grad_divisor(mut self, divisor: usize) -> Self {
        self.grad_divisor = divisor.max(1) as f32;
        self
    }

    /// Set the reciprocal of the loss scale used for the next update
    pub fn set_inv_scale(&mut self, inv_scale: f32) {
        self.inv_scale = inv_scale;
    }

    /// Whether the most recent update saw a non-finite gradient
    pub fn found_inf(&self) -> bool {
        self.found_inf
    }

    pub fn lr(&self) -> f32 {
        self.lr
    }

    pub fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    pub fn steps_applied(&self) -> usize {
        self.steps_applied
    }

    pub fn steps_skipped(&self) -> usize {
        self.steps_skipped
    }
}

impl Optimizer for ScaledSgd {
    fn apply_update(&mut self) -> Result<()> {
        if !self.lr.is_finite() {
            return Err(Error::Optimizer(format!("learning rate is not finite: {}", self.lr)));
        }
        let factor = self.inv_scale / self.grad_divisor;

        // Unscale everything first so an overflow anywhere skips the whole step.
        let mut unscaled = Vec::with_capacity(self.params.len());
        let mut finite = true;
        for param in &self.params {
            let Some(grad) = param.grad() else { continue };
            let mut values = grad.to_vec();
            finite &= unscale_and_check(&mut values, factor);
            unscaled.push((param, values));
        }

        self.found_inf = !finite;
        if !finite {
            self.steps_skipped += 1;
            return Ok(());
        }

        for (param, grad) in unscaled {
            param.data().write(|data| {
                for (d, g) in data.iter_mut().zip(&grad) {
                    *d -= self.lr * g;
                }
            });
        }
        self.steps_applied += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn param(name: &str, data: Vec<f32>, grad: Vec<f32>) -> Parameter {
        let p = Parameter::new(name, data);
        p.ensure_grad().write(|g| g.copy_from_slice(&grad));
        p
    }

    #[test]
    fn test_sgd_step() {
        let p = param("w", vec![1.0, 2.0], vec![0.5, 1.0]);
        let mut opt = ScaledSgd::new(vec![p.clone()], 0.1);
        opt.apply_update().unwrap();

        let data = p.data().to_vec();
        assert_relative_eq!(data[0], 0.95, epsilon = 1e-6);
        assert_relative_eq!(data[1], 1.9, epsilon = 1e-6);
        assert!(!opt.found_inf());
        assert_eq!(opt.steps_applied(), 1);
    }

    #[test]
    fn test_sgd_unscales_and_averages() {
        // Two ranks, loss scale 1024: summed grad = 2 * 1024 * true_grad
        let p = param("w", vec![0.0], vec![2048.0]);
        let mut opt = ScaledSgd::new(vec![p.clone()], 1.0).with_grad_divisor(2);
        opt.set_inv_scale(1.0 / 1024.0);
        opt.apply_update().unwrap();
        assert_relative_eq!(p.data().to_vec()[0], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sgd_skips_on_overflow() {
        let a = param("a", vec![1.0], vec![1.0]);
        let b = param("b", vec![1.0], vec![f32::INFINITY]);
        let mut opt = ScaledSgd::new(vec![a.clone(), b.clone()], 0.1);
        opt.apply_update().unwrap();

        assert!(opt.found_inf());
        assert_eq!(opt.steps_skipped(), 1);
        assert_eq!(a.data().to_vec(), vec![1.0]);
        assert_eq!(b.data().to_vec(), vec![1.0]);
    }

    #[test]
    fn test_sgd_found_inf_clears_on_healthy_step() {
        let p = param("w", vec![0.0], vec![f32::NAN]);
        let mut opt = ScaledSgd::new(vec![p.clone()], 0.1);
        opt.apply_update().unwrap();
        assert!(opt.found_inf());

        p.grad().unwrap().fill(1.0);
        opt.apply_update().unwrap();
        assert!(!opt.found_inf());
    }

    #[test]
    fn test_sgd_ignores_params_without_grad() {
        let p = Parameter::new("frozen", vec![3.0]);
        let mut opt = ScaledSgd::new(vec![p.clone()], 0.1);
        opt.apply_update().unwrap();
        assert_eq!(p.data().to_vec(), vec![3.0]);
    }

    #[test]
    fn test_sgd_rejects_non_finite_lr() {
        let mut opt = ScaledSgd::new(Vec::new(), f32::NAN);
        assert!(matches!(opt.apply_update(), Err(Error::Optimizer(_))));
        opt.set_lr(0.01);
        assert_eq!(opt.lr(), 0.01);
        assert!(opt.apply_update().is_ok());
    }
}
