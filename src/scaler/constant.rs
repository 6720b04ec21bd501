//! Loss scale fixed for the whole run.

use super::ScalerConfig;
use crate::error::{Error, Result};

/// Scale fixed at construction; `update` never changes it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantGradScaler {
    scale: f32,
}

impl ConstantGradScaler {
    pub fn new(scale: f32) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::config(
                "initial_scale",
                format!("must be finite and > 0, got {scale}"),
            ));
        }
        Ok(Self { scale })
    }

    pub fn from_config(config: &ScalerConfig) -> Result<Self> {
        Self::new(config.initial_scale)
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn inv_scale(&self) -> f32 {
        (1.0 / f64::from(self.scale)) as f32
    }

    pub fn update(&mut self, _found_inf: bool) {}
}
