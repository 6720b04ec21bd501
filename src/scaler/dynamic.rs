//! Loss scale that grows on healthy runs and backs off after overflow.

use tracing::info;

use super::{ScalerConfig, ScalerKind, ScalerState};
use crate::error::{Error, Result};

/// Dynamic loss-scale controller with hysteresis.
///
/// Single writer: `update` must be called once per step, from the thread
/// that owns the training loop.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicGradScaler {
    scale: f32,
    min_scale: f32,
    growth_factor: f32,
    backoff_factor: f32,
    growth_interval: u32,
    hysteresis: u32,
    growth_tracker: u32,
    hysteresis_tracker: i64,
}

impl DynamicGradScaler {
    /// Build from a validated config. Fails on any precondition violation.
    pub fn new(config: &ScalerConfig) -> Result<Self> {
        let config = ScalerConfig { kind: ScalerKind::Dynamic, ..config.clone() };
        config.validate()?;
        Ok(Self {
            scale: config.initial_scale,
            min_scale: config.min_scale,
            growth_factor: config.growth_factor,
            backoff_factor: config.backoff_factor,
            growth_interval: config.growth_interval,
            hysteresis: config.hysteresis,
            growth_tracker: 0,
            hysteresis_tracker: i64::from(config.hysteresis),
        })
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Reciprocal computed in f64 before narrowing
    pub fn inv_scale(&self) -> f32 {
        (1.0 / f64::from(self.scale)) as f32
    }

    pub fn min_scale(&self) -> f32 {
        self.min_scale
    }

    pub fn growth_factor(&self) -> f32 {
        self.growth_factor
    }

    pub fn backoff_factor(&self) -> f32 {
        self.backoff_factor
    }

    pub fn growth_interval(&self) -> u32 {
        self.growth_interval
    }

    pub fn hysteresis(&self) -> u32 {
        self.hysteresis
    }

    pub fn growth_tracker(&self) -> u32 {
        self.growth_tracker
    }

    pub fn hysteresis_tracker(&self) -> i64 {
        self.hysteresis_tracker
    }

    /// Advance one step given whether this step overflowed.
    ///
    /// After a backoff the hysteresis tracker is left where it is (zero or
    /// below); only a completed growth interval refills it. Consecutive
    /// overflows past the first backoff therefore back off on every step.
    pub fn update(&mut self, found_inf: bool) {
        if found_inf {
            self.growth_tracker = 0;
            self.hysteresis_tracker -= 1;
            if self.hysteresis_tracker <= 0 {
                self.scale = (self.scale * self.backoff_factor).max(self.min_scale);
                info!(
                    scale = self.scale,
                    hysteresis_tracker = self.hysteresis_tracker,
                    "loss scale backoff"
                );
            }
        } else {
            self.growth_tracker += 1;
            if self.growth_tracker == self.growth_interval {
                self.growth_tracker = 0;
                self.hysteresis_tracker = i64::from(self.hysteresis);
                self.scale *= self.growth_factor;
                info!(scale = self.scale, "loss scale growth");
            }
        }
    }

    /// Snapshot for checkpointing
    pub fn state_dict(&self) -> ScalerState {
        ScalerState {
            scale: self.scale,
            growth_tracker: self.growth_tracker,
            hysteresis_tracker: self.hysteresis_tracker,
        }
    }

    /// Restore the three checkpointed fields; configuration is untouched.
    pub fn load_state_dict(&mut self, state: &ScalerState) -> Result<()> {
        // Growth is unbounded, so +inf is a reachable scale.
        if !(state.scale > 0.0) {
            return Err(Error::InvalidCheckpoint(format!(
                "scale must be > 0, got {}",
                state.scale
            )));
        }
        if state.scale < self.min_scale {
            return Err(Error::InvalidCheckpoint(format!(
                "scale {} is below configured min_scale {}",
                state.scale, self.min_scale
            )));
        }
        if state.growth_tracker >= self.growth_interval {
            return Err(Error::InvalidCheckpoint(format!(
                "growth_tracker {} must be below growth_interval {}",
                state.growth_tracker, self.growth_interval
            )));
        }
        if state.hysteresis_tracker > i64::from(self.hysteresis) {
            return Err(Error::InvalidCheckpoint(format!(
                "hysteresis_tracker {} exceeds configured hysteresis {}",
                state.hysteresis_tracker, self.hysteresis
            )));
        }
        self.scale = state.scale;
        self.growth_tracker = state.growth_tracker;
        self.hysteresis_tracker = state.hysteresis_tracker;
        Ok(())
    }
}
