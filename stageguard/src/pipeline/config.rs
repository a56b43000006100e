//! Engine configuration.
//!
//! Configuration is an explicit value handed to the executor at construction;
//! nothing here is process-global.

use super::RecoveryStrategy;
use crate::errors::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Configuration for the pipeline execution engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Strategy used by stages without an override.
    #[serde(default)]
    pub default_strategy: RecoveryStrategy,
    /// Per-stage strategy overrides, keyed by stage name.
    #[serde(default)]
    pub stage_strategies: HashMap<String, RecoveryStrategy>,
    /// Upper bound on concurrently running stages within a level.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Register a recovery issue for every permanent stage failure.
    #[serde(default = "default_route_permanent_failures")]
    pub route_permanent_failures: bool,
    /// Run the bound workflow immediately after registering an issue.
    #[serde(default)]
    pub auto_recover: bool,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_route_permanent_failures() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_strategy: RecoveryStrategy::default(),
            stage_strategies: HashMap::new(),
            max_concurrency: default_max_concurrency(),
            route_permanent_failures: default_route_permanent_failures(),
            auto_recover: false,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default strategy.
    #[must_use]
    pub fn with_default_strategy(mut self, strategy: RecoveryStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Adds a per-stage override.
    #[must_use]
    pub fn with_stage_strategy(mut self, stage: impl Into<String>, strategy: RecoveryStrategy) -> Self {
        self.stage_strategies.insert(stage.into(), strategy);
        self
    }

    /// Sets the worker pool bound.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Enables or disables issue registration for permanent failures.
    #[must_use]
    pub fn with_route_permanent_failures(mut self, enabled: bool) -> Self {
        self.route_permanent_failures = enabled;
        self
    }

    /// Enables or disables running workflows right after issue registration.
    #[must_use]
    pub fn with_auto_recover(mut self, enabled: bool) -> Self {
        self.auto_recover = enabled;
        self
    }

    /// Resolves the strategy for a stage from the config alone.
    #[must_use]
    pub fn strategy_for(&self, stage: &str) -> &RecoveryStrategy {
        self.stage_strategies
            .get(stage)
            .unwrap_or(&self.default_strategy)
    }

    /// Validates every strategy and the concurrency bound.
    ///
    /// # Errors
    ///
    /// Returns the first invalid strategy or a `Config` error.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_concurrency == 0 {
            return Err(PipelineError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        self.default_strategy.validate()?;
        for (stage, strategy) in &self.stage_strategies {
            strategy.validate().map_err(|e| match e {
                PipelineError::InvalidStrategy(msg) => {
                    PipelineError::InvalidStrategy(format!("stage '{stage}': {msg}"))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed JSON or a validation error.
    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, otherwise as
    /// [`from_json_str`](Self::from_json_str).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrency, 4);
        assert!(config.route_permanent_failures);
        assert!(!config.auto_recover);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strategy_resolution() {
        let fast = RecoveryStrategy::new().with_max_retries(0);
        let config = EngineConfig::new().with_stage_strategy("deploy", fast.clone());

        assert_eq!(config.strategy_for("deploy"), &fast);
        assert_eq!(config.strategy_for("build"), &config.default_strategy);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = EngineConfig::new().with_max_concurrency(0);
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_from_json_str() {
        let config = EngineConfig::from_json_str(
            r#"{
                "max_concurrency": 8,
                "default_strategy": {"max_retries": 1},
                "stage_strategies": {"review": {"circuit_breaker_threshold": 2}},
                "auto_recover": true
            }"#,
        )
        .unwrap();

        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.default_strategy.max_retries, 1);
        assert_eq!(config.strategy_for("review").circuit_breaker_threshold, 2);
        assert!(config.auto_recover);
    }

    #[test]
    fn test_from_json_str_rejects_invalid_override() {
        let err = EngineConfig::from_json_str(
            r#"{"stage_strategies": {"review": {"backoff_multiplier": 0.1}}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("review"));
    }

    #[test]
    fn test_override_error_names_stage_once() {
        let mut config = EngineConfig::default();
        config
            .stage_strategies
            .insert("x".to_string(), RecoveryStrategy::new().with_retry_delay(0.0));

        let err = config.validate().unwrap_err();
        let PipelineError::InvalidStrategy(msg) = &err else {
            panic!("expected invalid strategy, got {err:?}");
        };
        assert!(msg.starts_with("stage 'x': "));
        assert!(!msg.contains("Invalid recovery strategy"));
        assert_eq!(err.to_string().matches("Invalid recovery strategy").count(), 1);
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_concurrency": 2}}"#).unwrap();

        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_concurrency, 2);
    }

    #[test]
    fn test_from_missing_file() {
        let err = EngineConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
