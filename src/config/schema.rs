//! YAML schema for data-parallel runs

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::scaler::ScalerConfig;

/// Deserialize a bool from either a YAML boolean (`true`) or a quoted string (`"true"`).
fn deserialize_bool_lenient<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Str(String),
    }

    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::Str(s) => match s.to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected 'true' or 'false', got '{other}'"
            ))),
        },
    }
}

fn default_true() -> bool {
    true
}

fn default_world_size() -> usize {
    1
}

/// Data-parallel group membership and reduction mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataParallelConfig {
    /// Ranks in the data-parallel group
    #[serde(default = "default_world_size")]
    pub world_size: usize,
    /// This process's rank (0-based)
    #[serde(default)]
    pub rank: usize,
    /// Reduce one flattened buffer instead of one buffer per parameter
    #[serde(default = "default_true", deserialize_with = "deserialize_bool_lenient")]
    pub flatten: bool,
    /// Produce trace records for every step
    #[serde(default, deserialize_with = "deserialize_bool_lenient")]
    pub profiling: bool,
}

impl DataParallelConfig {
    pub fn new(world_size: usize, rank: usize) -> Self {
        Self { world_size, rank, ..Self::default() }
    }

    pub fn with_flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }

    pub fn with_profiling(mut self, profiling: bool) -> Self {
        self.profiling = profiling;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.world_size == 0 {
            return Err(Error::config("world_size", "must be positive, got 0"));
        }
        if self.rank >= self.world_size {
            return Err(Error::config(
                "rank",
                format!("must be below world_size ({}), got {}", self.world_size, self.rank),
            ));
        }
        Ok(())
    }
}

impl Default for DataParallelConfig {
    fn default() -> Self {
        Self { world_size: 1, rank: 0, flatten: true, profiling: false }
    }
}

/// One synthetic parameter for `simulate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub numel: usize,
    /// Parameters with `requires_grad: false` never receive a gradient
    #[serde(default = "default_true", deserialize_with = "deserialize_bool_lenient")]
    pub requires_grad: bool,
}

fn default_steps() -> usize {
    10
}

fn default_learning_rate() -> f32 {
    0.01
}

/// Synthetic training loop driven by the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSpec {
    #[serde(default = "default_steps")]
    pub steps: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    pub parameters: Vec<ParameterSpec>,
    /// 1-based steps on which backward produces a non-finite gradient
    #[serde(default)]
    pub overflow_steps: Vec<usize>,
}

impl Default for SimulationSpec {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            learning_rate: default_learning_rate(),
            parameters: Vec::new(),
            overflow_steps: Vec::new(),
        }
    }
}

/// Complete run specification
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunSpec {
    #[serde(default)]
    pub data_parallel: DataParallelConfig,
    #[serde(default)]
    pub scaler: ScalerConfig,
    #[serde(default)]
    pub simulation: SimulationSpec,
}
