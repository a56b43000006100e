//! Per-stage execution result.

use super::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of running one stage through the retry coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name.
    pub stage: String,
    /// Whether the stage succeeded.
    pub success: bool,
    /// Elapsed time across all attempts and backoff sleeps, in milliseconds.
    pub duration_ms: f64,
    /// Error message of the last failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Payload returned by the successful attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Number of attempts actually made.
    pub attempts: u32,
    /// Failure classification; `None` on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Whether the timeout watchdog fired during any attempt.
    #[serde(default)]
    pub timed_out: bool,
    /// When the first attempt started.
    pub started_at: DateTime<Utc>,
    /// When the result was produced.
    pub ended_at: DateTime<Utc>,
}

impl StageResult {
    /// Creates a successful result.
    #[must_use]
    pub fn succeeded(
        stage: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
        attempts: u32,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            stage: stage.into(),
            success: true,
            duration_ms: duration.as_secs_f64() * 1000.0,
            error: None,
            payload: Some(payload),
            attempts,
            failure: None,
            timed_out: false,
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(
        stage: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
        attempts: u32,
        kind: FailureKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            success: false,
            duration_ms: duration.as_secs_f64() * 1000.0,
            error: Some(error.into()),
            payload: None,
            attempts,
            failure: Some(kind),
            timed_out: false,
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// Marks that the timeout watchdog fired.
    #[must_use]
    pub fn with_timed_out(mut self, timed_out: bool) -> Self {
        self.timed_out = timed_out;
        self
    }

    /// Returns the elapsed duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_ms.max(0.0) / 1000.0)
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.success
    }

    /// Returns true if this is a final failure that should be routed to recovery.
    #[must_use]
    pub fn is_permanent_failure(&self) -> bool {
        self.failure.is_some_and(|kind| kind.is_permanent())
    }
}
