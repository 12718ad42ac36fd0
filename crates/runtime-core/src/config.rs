//! Checkpoint configuration types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Error, Iteration, Result, FIELD_SEPARATOR};

/// Checkpoint controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Unique name of the run; the namespace of every generation it writes
    pub run_name: String,

    /// Directory holding this rank's checkpoint files
    pub base_path: PathBuf,

    /// Number of agreed generations guaranteed to be preserved
    pub cp_interval: usize,

    /// How far the tracked list may grow past `cp_interval` before a
    /// pruning sync round runs
    pub sync_slack: usize,

    /// When periodic checkpoints fire
    pub strategy: CheckpointStrategy,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            run_name: String::new(),
            base_path: PathBuf::from("./checkpoints"),
            cp_interval: 5,
            sync_slack: 5,
            strategy: CheckpointStrategy::default(),
        }
    }
}

impl CheckpointConfig {
    /// Create a configuration for the given run with default settings
    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            run_name: run_name.into(),
            ..Default::default()
        }
    }

    /// Set the checkpoint directory
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = path.into();
        self
    }

    /// Set the number of preserved generations
    pub fn with_cp_interval(mut self, cp_interval: usize) -> Self {
        self.cp_interval = cp_interval;
        self
    }

    /// Set the pruning slack
    pub fn with_sync_slack(mut self, sync_slack: usize) -> Self {
        self.sync_slack = sync_slack;
        self
    }

    /// Set the checkpoint strategy
    pub fn with_strategy(mut self, strategy: CheckpointStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfig {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), run = %config.run_name, "Loaded checkpoint config");
        Ok(config)
    }

    /// Check the invariants the controller relies on
    pub fn validate(&self) -> Result<()> {
        if self.run_name.is_empty() {
            return Err(Error::InvalidConfig {
                message: "run_name must not be empty".to_string(),
            });
        }
        if self.run_name.contains(FIELD_SEPARATOR) || self.run_name.contains('/') {
            return Err(Error::InvalidConfig {
                message: format!(
                    "run_name {:?} must not contain '{}' or '/'",
                    self.run_name, FIELD_SEPARATOR
                ),
            });
        }
        if self.cp_interval == 0 {
            return Err(Error::InvalidConfig {
                message: "cp_interval must be greater than zero".to_string(),
            });
        }
        match self.strategy {
            CheckpointStrategy::Steps { interval: 0 } => Err(Error::InvalidConfig {
                message: "step interval must be greater than zero".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Checkpoint strategy configuration
///
/// Strategies are driven by the iteration counter only, so every rank fires
/// at the same iterations and the agreement collectives stay in lockstep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CheckpointStrategy {
    /// Checkpoint every N iterations
    Steps { interval: Iteration },

    /// No automatic checkpointing (manual only)
    Manual,
}

impl Default for CheckpointStrategy {
    fn default() -> Self {
        CheckpointStrategy::Steps { interval: 1000 }
    }
}
