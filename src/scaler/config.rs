//! Configuration for loss-scale controllers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of healthy steps before the loss scale is increased
const DEFAULT_SCALE_GROWTH_INTERVAL: u32 = 1000;

/// Which controller variant to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalerKind {
    /// Scale fixed at construction
    Constant,
    /// Scale grows on healthy runs and backs off on overflow
    #[default]
    Dynamic,
}

impl fmt::Display for ScalerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalerKind::Constant => write!(f, "constant"),
            ScalerKind::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Configuration for a loss-scale controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalerConfig {
    /// Controller variant
    pub kind: ScalerKind,
    /// Initial loss scale factor
    pub initial_scale: f32,
    /// Lower bound the scale never drops below
    pub min_scale: f32,
    /// Factor to increase scale by after a healthy interval
    pub growth_factor: f32,
    /// Factor to decrease scale by once hysteresis is exhausted
    pub backoff_factor: f32,
    /// Consecutive healthy steps required before growing
    pub growth_interval: u32,
    /// Overflow steps tolerated before shrinking
    pub hysteresis: u32,
}

impl ScalerConfig {
    /// Dynamic scaling tuned for fp16
    pub fn fp16() -> Self {
        Self {
            kind: ScalerKind::Dynamic,
            initial_scale: 65536.0, // 2^16
            min_scale: 1.0,
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: DEFAULT_SCALE_GROWTH_INTERVAL,
            hysteresis: 2,
        }
    }

    /// Fixed scale (bf16 and fp32 rarely need dynamic scaling)
    pub fn constant(scale: f32) -> Self {
        Self { kind: ScalerKind::Constant, initial_scale: scale, ..Self::fp16() }
    }

    pub fn with_initial_scale(mut self, scale: f32) -> Self {
        self.initial_scale = scale;
        self
    }

    pub fn with_min_scale(mut self, scale: f32) -> Self {
        self.min_scale = scale;
        self
    }

    pub fn with_growth_factor(mut self, factor: f32) -> Self {
        self.growth_factor = factor;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f32) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_growth_interval(mut self, steps: u32) -> Self {
        self.growth_interval = steps;
        self
    }

    pub fn with_hysteresis(mut self, steps: u32) -> Self {
        self.hysteresis = steps;
        self
    }

    /// Check every construction precondition.
    ///
    /// The constant variant only needs a positive initial scale.
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_scale.is_finite() && self.initial_scale > 0.0) {
            return Err(Error::config(
                "initial_scale",
                format!("must be finite and > 0, got {}", self.initial_scale),
            ));
        }
        if self.kind == ScalerKind::Constant {
            return Ok(());
        }
        if !(self.min_scale > 0.0) {
            return Err(Error::config(
                "min_scale",
                format!("must be > 0, got {}", self.min_scale),
            ));
        }
        if self.min_scale > self.initial_scale {
            return Err(Error::config(
                "min_scale",
                format!(
                    "must not exceed initial_scale ({}), got {}",
                    self.initial_scale, self.min_scale
                ),
            ));
        }
        if !(self.growth_factor.is_finite() && self.growth_factor > 1.0) {
            return Err(Error::config(
                "growth_factor",
                format!("must be > 1.0, got {}", self.growth_factor),
            ));
        }
        if !(self.backoff_factor > 0.0 && self.backoff_factor < 1.0) {
            return Err(Error::config(
                "backoff_factor",
                format!("must be in (0, 1), got {}", self.backoff_factor),
            ));
        }
        if self.growth_interval == 0 {
            return Err(Error::config("growth_interval", "must be positive, got 0"));
        }
        if self.hysteresis == 0 {
            return Err(Error::config("hysteresis", "must be positive, got 0"));
        }
        Ok(())
    }
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self::fp16()
    }
}
