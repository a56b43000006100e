//! Health records and reports.

use crate::core::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health counters and circuit state for one stage.
///
/// When `circuit_open` is true, `circuit_open_until` holds the instant the
/// open window expires.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StageHealth {
    /// Consecutive failures; reset to zero by any success.
    pub failure_count: u32,
    /// When the last failure was recorded.
    pub last_failure: Option<DateTime<Utc>>,
    /// When the last success was recorded.
    pub last_success: Option<DateTime<Utc>>,
    /// Successful executions.
    pub execution_count: u64,
    /// Failed attempts over the record's lifetime.
    pub total_failures: u64,
    /// Accumulated duration of successful executions, in milliseconds.
    pub total_duration_ms: f64,
    /// Whether the circuit is open.
    pub circuit_open: bool,
    /// When the open window expires.
    pub circuit_open_until: Option<DateTime<Utc>>,
}

impl StageHealth {
    /// Returns the circuit state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        if self.circuit_open {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    /// Mean duration of successful executions, in milliseconds.
    #[must_use]
    pub fn average_duration_ms(&self) -> Option<f64> {
        if self.execution_count == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = self.execution_count as f64;
        Some(self.total_duration_ms / count)
    }
}

/// Point-in-time summary of every tracked stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReport {
    /// Number of stages with a health record.
    pub tracked_stages: usize,
    /// Stages whose circuit is open, sorted.
    pub open_circuits: Vec<String>,
    /// Stages with at least one consecutive failure, sorted.
    pub failing_stages: Vec<String>,
    /// Successful executions across all stages.
    pub total_executions: u64,
    /// Mean successful duration per stage, in milliseconds.
    pub average_duration_ms: BTreeMap<String, f64>,
}

impl HealthReport {
    /// Returns true if no circuit is open and nothing is failing.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.open_circuits.is_empty() && self.failing_stages.is_empty()
    }
}
