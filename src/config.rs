//! Harness configuration: defaults, JSON loading and validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::evaluation::EvaluationConfig;
use crate::factorize::FactorizerConfig;

/// Everything a run needs besides the input files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Seed for hiding pairs and for the strategy RNG.
    pub seed: u64,
    /// Fraction of distinct unordered pairs hidden from the working copy.
    pub hide_fraction: f64,
    pub factorizer: FactorizerConfig,
    pub evaluation: EvaluationConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            seed: 1337,
            hide_fraction: 0.5,
            factorizer: FactorizerConfig::default(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.hide_fraction) {
            return Err(ConfigError::Invalid(
                "hide_fraction must be in [0,1]".to_string(),
            ));
        }
        let f = &self.factorizer;
        if f.rank == 0 {
            return Err(ConfigError::Invalid("rank must be >= 1".to_string()));
        }
        if f.max_iter == 0 {
            return Err(ConfigError::Invalid("max_iter must be >= 1".to_string()));
        }
        if !f.beta.is_finite() || f.beta < 0.0 {
            return Err(ConfigError::Invalid("beta must be >= 0".to_string()));
        }
        if !f.eta.is_finite() {
            return Err(ConfigError::Invalid("eta must be finite".to_string()));
        }
        if self.evaluation.max_consecutive_misses == 0 {
            return Err(ConfigError::Invalid(
                "max_consecutive_misses must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads a JSON config; missing fields take their defaults.
pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<HarnessConfig, ConfigError> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    let config: HarnessConfig = serde_json::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}
