//! Loss-scale controllers for reduced-precision training.
//!
//! Gradients computed in fp16 underflow easily, so the loss is multiplied by
//! a scale before backward and the gradients are divided by it before the
//! optimizer consumes them. The controller decides that scale:
//!
//! - [`ConstantGradScaler`] keeps it fixed.
//! - [`DynamicGradScaler`] multiplies it by `growth_factor` after
//!   `growth_interval` consecutive healthy steps, and by `backoff_factor`
//!   (clamped to `min_scale`) once `hysteresis` overflow steps have been
//!   observed.
//!
//! ## Example
//!
//! ```
//! use gradsync::scaler::{GradScaler, ScalerConfig};
//!
//! let config = ScalerConfig::fp16()
//!     .with_growth_interval(2)
//!     .with_hysteresis(1);
//! let mut scaler = GradScaler::from_config(&config)?;
//!
//! scaler.update(false);
//! scaler.update(false);
//! assert_eq!(scaler.scale(), 131072.0);
//!
//! scaler.update(true);
//! assert_eq!(scaler.scale(), 65536.0);
//! # Ok::<(), gradsync::Error>(())
//! ```

mod config;
mod constant;
mod dynamic;
mod state;


pub use config::{ScalerConfig, ScalerKind};
pub use constant::ConstantGradScaler;
pub use dynamic::DynamicGradScaler;
pub use state::ScalerState;

use crate::error::Result;

/// Either scaler variant behind one interface.
#[derive(Debug, Clone, PartialEq)]
pub enum GradScaler {
    Constant(ConstantGradScaler),
    Dynamic(DynamicGradScaler),
}

impl GradScaler {
    /// Build the variant named by `config.kind`, validating it first.
    pub fn from_config(config: &ScalerConfig) -> Result<Self> {
        Ok(match config.kind {
            ScalerKind::Constant => Self::Constant(ConstantGradScaler::from_config(config)?),
            ScalerKind::Dynamic => Self::Dynamic(DynamicGradScaler::new(config)?),
        })
    }

    pub fn kind(&self) -> ScalerKind {
        match self {
            Self::Constant(_) => ScalerKind::Constant,
            Self::Dynamic(_) => ScalerKind::Dynamic,
        }
    }

    pub fn scale(&self) -> f32 {
        match self {
            Self::Constant(s) => s.scale(),
            Self::Dynamic(s) => s.scale(),
        }
    }

    pub fn inv_scale(&self) -> f32 {
        match self {
            Self::Constant(s) => s.inv_scale(),
            Self::Dynamic(s) => s.inv_scale(),
        }
    }

    /// Scale a loss value before backward
    pub fn scale_loss(&self, loss: f32) -> f32 {
        loss * self.scale()
    }

    /// Feed one step's overflow observation
    pub fn update(&mut self, found_inf: bool) {
        match self {
            Self::Constant(s) => s.update(found_inf),
            Self::Dynamic(s) => s.update(found_inf),
        }
    }

    /// Checkpoint snapshot; the constant variant has nothing to save.
    pub fn state_dict(&self) -> Option<ScalerState> {
        match self {
            Self::Constant(_) => None,
            Self::Dynamic(s) => Some(s.state_dict()),
        }
    }

    /// Restore from a snapshot; a no-op for the constant variant.
    pub fn load_state_dict(&mut self, state: &ScalerState) -> Result<()> {
        match self {
            Self::Constant(_) => Ok(()),
            Self::Dynamic(s) => s.load_state_dict(state),
        }
    }
}

/// Unscale gradients in place and check for overflow.
///
/// Returns true if every value is finite after unscaling.
pub fn unscale_and_check(grads: &mut [f32], inv_scale: f32) -> bool {
    let mut finite = true;
    for grad in grads.iter_mut() {
        *grad *= inv_scale;
        if !grad.is_finite() {
            finite = false;
        }
    }
    finite
}
