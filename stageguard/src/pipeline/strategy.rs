//! Per-stage recovery strategy: retry budget, backoff, timeout and circuit breaker tuning.

use crate::errors::PipelineError;
use crate::utils::timestamps::{chrono_from_secs, duration_from_secs};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a stage is retried, timed and circuit-broken.
///
/// All numeric fields must be positive, except `max_retries`, which may be
/// zero (a single attempt).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStrategy {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: f64,
    /// Multiplier applied to the delay for each subsequent retry.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Per-attempt timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    /// How long the circuit stays open, in seconds.
    #[serde(default = "default_circuit_breaker_timeout")]
    pub circuit_breaker_timeout_seconds: f64,
    /// Cancel attempts that exceed the timeout instead of only logging.
    #[serde(default)]
    pub enforce_timeout: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    1.0
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_timeout() -> f64 {
    300.0
}

fn default_circuit_breaker_threshold() -> u32 {
    5
}

fn default_circuit_breaker_timeout() -> f64 {
    60.0
}

impl Default for RecoveryStrategy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_seconds: default_retry_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            timeout_seconds: default_timeout(),
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            circuit_breaker_timeout_seconds: default_circuit_breaker_timeout(),
            enforce_timeout: false,
        }
    }
}

impl RecoveryStrategy {
    /// Creates a strategy with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base retry delay.
    #[must_use]
    pub fn with_retry_delay(mut self, seconds: f64) -> Self {
        self.retry_delay_seconds = seconds;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the circuit breaker threshold and open window.
    #[must_use]
    pub fn with_circuit_breaker(mut self, threshold: u32, timeout_seconds: f64) -> Self {
        self.circuit_breaker_threshold = threshold;
        self.circuit_breaker_timeout_seconds = timeout_seconds;
        self
    }

    /// Cancels attempts that run past the timeout.
    #[must_use]
    pub fn enforcing_timeout(mut self) -> Self {
        self.enforce_timeout = true;
        self
    }

    /// Checks the strategy invariants.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidStrategy` naming the first offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let positive = |value: f64| value.is_finite() && value > 0.0;

        if !positive(self.retry_delay_seconds) {
            return Err(PipelineError::InvalidStrategy(format!(
                "retry_delay_seconds must be > 0, got {}",
                self.retry_delay_seconds
            )));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(PipelineError::InvalidStrategy(format!(
                "backoff_multiplier must be >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        if !positive(self.timeout_seconds) {
            return Err(PipelineError::InvalidStrategy(format!(
                "timeout_seconds must be > 0, got {}",
                self.timeout_seconds
            )));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(PipelineError::InvalidStrategy(
                "circuit_breaker_threshold must be > 0".to_string(),
            ));
        }
        if !positive(self.circuit_breaker_timeout_seconds) {
            return Err(PipelineError::InvalidStrategy(format!(
                "circuit_breaker_timeout_seconds must be > 0, got {}",
                self.circuit_breaker_timeout_seconds
            )));
        }
        Ok(())
    }

    /// Total attempts allowed (first attempt plus retries).
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to sleep before the given zero-based attempt.
    ///
    /// Attempt 0 runs immediately; attempt `n > 0` waits
    /// `retry_delay_seconds * backoff_multiplier^(n-1)`.
    #[must_use]
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        backoff_delay(self.retry_delay_seconds, self.backoff_multiplier, attempt - 1)
    }

    /// Per-attempt timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        duration_from_secs(self.timeout_seconds)
    }

    /// How long an opened circuit stays open.
    #[must_use]
    pub fn circuit_open_window(&self) -> chrono::Duration {
        chrono_from_secs(self.circuit_breaker_timeout_seconds)
    }
}

/// Exponential backoff: `base_seconds * multiplier^retry_index`.
#[must_use]
pub fn backoff_delay(base_seconds: f64, multiplier: f64, retry_index: u32) -> Duration {
    let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
    duration_from_secs(base_seconds * multiplier.powi(exponent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_strategy() {
        let strategy = RecoveryStrategy::default();
        assert_eq!(strategy.max_retries, 3);
        assert_eq!(strategy.max_attempts(), 4);
        assert_eq!(strategy.circuit_breaker_threshold, 5);
        assert!(!strategy.enforce_timeout);
        assert!(strategy.validate().is_ok());
    }

    #[test]
    fn test_zero_retries_is_valid() {
        let strategy = RecoveryStrategy::new().with_max_retries(0);
        assert!(strategy.validate().is_ok());
        assert_eq!(strategy.max_attempts(), 1);
    }

    #[test]
    fn test_invalid_fields_rejected() {
        assert!(RecoveryStrategy::new().with_retry_delay(0.0).validate().is_err());
        assert!(RecoveryStrategy::new().with_backoff_multiplier(0.9).validate().is_err());
        assert!(RecoveryStrategy::new().with_timeout(-1.0).validate().is_err());
        assert!(RecoveryStrategy::new().with_circuit_breaker(0, 1.0).validate().is_err());
        assert!(RecoveryStrategy::new().with_circuit_breaker(1, 0.0).validate().is_err());
        assert!(RecoveryStrategy::new().with_retry_delay(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_backoff_schedule() {
        let strategy = RecoveryStrategy::new()
            .with_retry_delay(0.1)
            .with_backoff_multiplier(2.0);

        assert_eq!(strategy.delay_before_attempt(0), Duration::ZERO);
        assert_eq!(strategy.delay_before_attempt(1), Duration::from_millis(100));
        assert_eq!(strategy.delay_before_attempt(2), Duration::from_millis(200));
        assert_eq!(strategy.delay_before_attempt(3), Duration::from_millis(400));
        assert_eq!(strategy.delay_before_attempt(4), Duration::from_millis(800));
    }

    #[test]
    fn test_constant_backoff_with_unit_multiplier() {
        let strategy = RecoveryStrategy::new()
            .with_retry_delay(0.5)
            .with_backoff_multiplier(1.0);
        assert_eq!(strategy.delay_before_attempt(1), strategy.delay_before_attempt(5));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let strategy: RecoveryStrategy =
            serde_json::from_str(r#"{"max_retries": 0, "timeout_seconds": 5}"#).unwrap();
        assert_eq!(strategy.max_retries, 0);
        assert_eq!(strategy.timeout(), Duration::from_secs(5));
        assert_eq!(strategy.backoff_multiplier, 2.0);
    }
}
