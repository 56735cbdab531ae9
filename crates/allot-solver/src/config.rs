//! Solve configuration.
//!
//! Every limit defaults to unlimited and the search runs on the calling
//! thread. Configurations can be built in code or loaded from TOML:
//!
//! ```
//! use allot_solver::SolveConfig;
//!
//! let config = SolveConfig::from_toml_str(r#"
//!     time_limit_seconds = 2.5
//!     node_limit = 10000
//! "#).unwrap();
//!
//! assert_eq!(config.node_limit, Some(10_000));
//! assert_eq!(config.threads, 1);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Time limit must not be negative (got {0})")]
    NegativeTimeLimit(f64),

    #[error("Time limit must be a finite number (got {0})")]
    InvalidTimeLimit(f64),

    #[error("Thread count must be at least 1")]
    ZeroThreads,

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Budget and parallelism of one solve call.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolveConfig {
    /// Wall-clock budget; unset means unlimited.
    pub time_limit_seconds: Option<f64>,

    /// Maximum number of search nodes; unset means unlimited.
    pub node_limit: Option<u64>,

    /// Number of worker threads. `1` searches on the calling thread.
    pub threads: usize,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            time_limit_seconds: None,
            node_limit: None,
            threads: 1,
        }
    }
}

impl SolveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_limit_seconds(mut self, seconds: f64) -> Self {
        self.time_limit_seconds = Some(seconds);
        self
    }

    pub fn with_node_limit(mut self, nodes: u64) -> Self {
        self.node_limit = Some(nodes);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Parses and validates a configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(seconds) = self.time_limit_seconds {
            if !seconds.is_finite() {
                return Err(ConfigError::InvalidTimeLimit(seconds));
            }
            if seconds < 0.0 {
                return Err(ConfigError::NegativeTimeLimit(seconds));
            }
        }
        if self.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        Ok(())
    }

    /// The time limit as a duration. Limits too large for a `Duration` count as unset.
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_seconds
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_unlimited() {
        let config = SolveConfig::default();
        assert_eq!(config.time_limit(), None);
        assert_eq!(config.node_limit, None);
        assert_eq!(config.threads, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SolveConfig::new()
            .with_time_limit_seconds(1.5)
            .with_node_limit(42)
            .with_threads(4);
        assert_eq!(config.time_limit(), Some(Duration::from_millis(1500)));
        assert_eq!(config.node_limit, Some(42));
        assert_eq!(config.threads, 4);
    }

    #[test]
    fn test_invalid_values() {
        let err = SolveConfig::new().with_time_limit_seconds(-1.0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::NegativeTimeLimit(_)));

        let err = SolveConfig::new()
            .with_time_limit_seconds(f64::NAN)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeLimit(_)));

        let err = SolveConfig::new().with_threads(0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::ZeroThreads));
    }

    #[test]
    fn test_from_toml() {
        let config = SolveConfig::from_toml_str("threads = 3\nnode_limit = 7").unwrap();
        assert_eq!(config.threads, 3);
        assert_eq!(config.node_limit, Some(7));
        assert_eq!(config.time_limit_seconds, None);

        let err = SolveConfig::from_toml_str("time_limit_seconds = -2.0").unwrap_err();
        assert!(matches!(err, ConfigError::NegativeTimeLimit(_)));

        let err = SolveConfig::from_toml_str("unknown_key = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SolveConfig::load("/nonexistent/allot/solve.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
