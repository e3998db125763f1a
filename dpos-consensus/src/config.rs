//! DPoS consensus configuration

use crate::{ConsensusError, ConsensusResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// DPoS consensus configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DposConfig {
    /// Seconds between block production slots
    pub block_interval: u64,
    /// Seconds per epoch; validators may be re-elected at each boundary
    pub epoch_interval: u64,
    /// Maximum number of elected validators
    pub max_validator_size: usize,
}

impl Default for DposConfig {
    fn default() -> Self {
        Self {
            block_interval: 10,
            epoch_interval: 86_400, // one day
            max_validator_size: 21,
        }
    }
}

impl DposConfig {
    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConsensusResult<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConsensusError::Config(format!("Failed to read config file: {}", e)))?;

        let config: DposConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConsensusResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConsensusError::Config(e.to_string()))?;
        fs::write(path.as_ref(), content)
            .map_err(|e| ConsensusError::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConsensusResult<()> {
        if self.block_interval == 0 {
            return Err(ConsensusError::Config(
                "Block interval must be greater than 0".to_string(),
            ));
        }

        if self.epoch_interval == 0 {
            return Err(ConsensusError::Config(
                "Epoch interval must be greater than 0".to_string(),
            ));
        }

        if self.epoch_interval % self.block_interval != 0 {
            return Err(ConsensusError::Config(
                "Epoch interval must be a multiple of the block interval".to_string(),
            ));
        }

        if self.max_validator_size == 0 {
            return Err(ConsensusError::Config(
                "At least one validator slot is required".to_string(),
            ));
        }

        Ok(())
    }

    /// Minimum candidate pool size that kickout must never drop below
    /// (two thirds of the validator slots, rounded up)
    pub fn safe_size(&self) -> usize {
        self.max_validator_size * 2 / 3 + 1
    }

    /// Mint-count threshold below which a validator is considered inactive
    /// for an epoch of the given duration
    pub fn kickout_threshold(&self, epoch_duration: u64) -> u64 {
        epoch_duration / self.block_interval / self.max_validator_size as u64 / 2
    }
}
