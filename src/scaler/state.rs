//! Checkpoint snapshot of a dynamic scaler.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The three fields restored on resume. Factors, bounds and intervals are
/// configuration and are rebuilt from config, never from a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub scale: f32,
    pub growth_tracker: u32,
    pub hysteresis_tracker: i64,
}

impl ScalerState {
    /// Write the snapshot as pretty JSON
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .map_err(|e| Error::io(format!("writing scaler checkpoint {}", path.display()), e))
    }

    /// Read a snapshot written by [`save_json`](Self::save_json)
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading scaler checkpoint {}", path.display()), e))?;
        Ok(serde_json::from_str(&json)?)
    }
}
