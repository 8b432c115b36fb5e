//! Search configuration and its defaults.

use std::path::PathBuf;

use nlf_core::{ErrorInfo, FitError};
use serde::{Deserialize, Serialize};

/// Default master seed used when a configuration omits one.
pub const DEFAULT_MASTER_SEED: u64 = 0x4e4c_465f_5345_4544;

/// Driver-level settings shared by every search backend.
///
/// Only `name` and `unique_tag` participate in the fit identifier; the
/// remaining fields are operational knobs that may change between
/// invocations of the same fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Root directory under which fit output directories are created.
    pub path_prefix: PathBuf,
    /// Human-readable name of the search, one path segment of the output.
    pub name: String,
    /// Optional tag that separates otherwise identical fits.
    #[serde(default)]
    pub unique_tag: Option<String>,
    /// Worker threads for batch likelihood evaluation.
    #[serde(default = "default_number_of_cores")]
    pub number_of_cores: usize,
    /// Checkpoint cadence, in driver iterations.
    #[serde(default = "default_iterations_per_update")]
    pub iterations_per_update: usize,
    /// Master seed from which all substream seeds are derived.
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
    /// Retries granted to a failing checkpoint or metadata write.
    #[serde(default = "default_persistence_retries")]
    pub persistence_retries: usize,
    /// Base backoff between persistence retries, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Iteration budget for a single `fit` invocation. When the budget is
    /// exhausted the driver checkpoints and returns with status `Running`.
    #[serde(default)]
    pub max_iterations_per_invocation: Option<usize>,
}

fn default_number_of_cores() -> usize {
    1
}

fn default_iterations_per_update() -> usize {
    500
}

fn default_master_seed() -> u64 {
    DEFAULT_MASTER_SEED
}

fn default_persistence_retries() -> usize {
    3
}

fn default_retry_backoff_ms() -> u64 {
    250
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            path_prefix: PathBuf::from("output"),
            name: "fit".to_string(),
            unique_tag: None,
            number_of_cores: default_number_of_cores(),
            iterations_per_update: default_iterations_per_update(),
            master_seed: default_master_seed(),
            persistence_retries: default_persistence_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_iterations_per_invocation: None,
        }
    }
}

impl SearchConfig {
    /// Parses a configuration from YAML, applying defaults for omitted keys.
    pub fn from_yaml_str(text: &str) -> Result<Self, FitError> {
        let config: SearchConfig = serde_yaml::from_str(text).map_err(|err| {
            FitError::Configuration(
                ErrorInfo::new("config-yaml", "failed to parse search configuration")
                    .with_context("error", err.to_string()),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the driver cannot operate with.
    pub fn validate(&self) -> Result<(), FitError> {
        if self.name.is_empty() {
            return Err(FitError::Configuration(ErrorInfo::new(
                "config-name",
                "search name must not be empty",
            )));
        }
        if self.number_of_cores == 0 {
            return Err(FitError::Configuration(ErrorInfo::new(
                "config-cores",
                "number_of_cores must be at least 1",
            )));
        }
        if self.iterations_per_update == 0 {
            return Err(FitError::Configuration(ErrorInfo::new(
                "config-cadence",
                "iterations_per_update must be at least 1",
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_defaults_apply_for_omitted_keys() {
        let config = SearchConfig::from_yaml_str(
            "path_prefix: output\nname: demo\nmaster_seed: 7\n",
        )
        .unwrap();
        assert_eq!(config.name, "demo");
        assert_eq!(config.master_seed, 7);
        assert_eq!(config.number_of_cores, 1);
        assert_eq!(config.iterations_per_update, 500);
        assert_eq!(config.max_iterations_per_invocation, None);
    }

    #[test]
    fn zero_cores_is_rejected() {
        let err = SearchConfig::from_yaml_str(
            "path_prefix: output\nname: demo\nnumber_of_cores: 0\n",
        )
        .unwrap_err();
        assert_eq!(err.info().code, "config-cores");
    }
}
