//! The stage health registry and its two-state circuit breaker.

use super::{HealthReport, StageHealth};
use crate::events::{emit_stamped, names, noop_sink, EventSink};
use crate::pipeline::RecoveryStrategy;
use crate::utils::timestamps::format_timestamp;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Circuit breaker tuning for one stage.
#[derive(Debug, Clone, Copy)]
struct BreakerSettings {
    threshold: u32,
    open_window: chrono::Duration,
}

impl From<&RecoveryStrategy> for BreakerSettings {
    fn from(strategy: &RecoveryStrategy) -> Self {
        Self {
            threshold: strategy.circuit_breaker_threshold.max(1),
            open_window: strategy.circuit_open_window(),
        }
    }
}

#[derive(Debug, Default)]
struct Entry {
    health: StageHealth,
    settings: Option<BreakerSettings>,
}

/// Owns every stage's health record.
///
/// All records live behind one mutex, so workers of different stages can
/// update their own records concurrently without extra coordination.
///
/// Transitions:
/// - `record_failure` opens the circuit once consecutive failures reach the threshold.
/// - `record_success` always closes it.
/// - `check_circuit` closes an open circuit whose window has expired.
pub struct StageHealthRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    defaults: BreakerSettings,
    event_sink: Arc<dyn EventSink>,
}

impl StageHealthRegistry {
    /// Creates a registry whose breaker defaults come from `strategy`.
    #[must_use]
    pub fn new(strategy: &RecoveryStrategy) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            defaults: BreakerSettings::from(strategy),
            event_sink: noop_sink(),
        }
    }

    /// Sets the sink that receives circuit transition events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Applies a stage-specific threshold and open window.
    pub fn configure_stage(&self, stage: &str, strategy: &RecoveryStrategy) {
        let mut entries = self.entries.lock();
        entries.entry(stage.to_string()).or_default().settings = Some(BreakerSettings::from(strategy));
    }

    /// Records a failed attempt and returns the updated record.
    pub fn record_failure(&self, stage: &str) -> StageHealth {
        let now = Utc::now();
        let (snapshot, opened) = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(stage.to_string()).or_default();
            let settings = entry.settings.unwrap_or(self.defaults);
            let health = &mut entry.health;

            health.failure_count = health.failure_count.saturating_add(1);
            health.total_failures = health.total_failures.saturating_add(1);
            health.last_failure = Some(now);

            let mut opened = false;
            if health.failure_count >= settings.threshold {
                opened = !health.circuit_open;
                health.circuit_open = true;
                health.circuit_open_until = Some(now + settings.open_window);
            }
            (health.clone(), opened)
        };

        if opened {
            warn!(
                stage = %stage,
                failure_count = snapshot.failure_count,
                "Circuit opened"
            );
            emit_stamped(
                self.event_sink.as_ref(),
                names::CIRCUIT_OPENED,
                serde_json::json!({
                    "stage": stage,
                    "failure_count": snapshot.failure_count,
                    "open_until": snapshot.circuit_open_until.as_ref().map(format_timestamp),
                }),
            );
        } else {
            debug!(stage = %stage, failure_count = snapshot.failure_count, "Failure recorded");
        }
        snapshot
    }

    /// Records a success, resetting the failure count and closing the circuit.
    pub fn record_success(&self, stage: &str, duration: Duration) -> StageHealth {
        let (snapshot, was_open) = {
            let mut entries = self.entries.lock();
            let health = &mut entries.entry(stage.to_string()).or_default().health;
            let was_open = health.circuit_open;

            health.failure_count = 0;
            health.execution_count = health.execution_count.saturating_add(1);
            health.total_duration_ms += duration.as_secs_f64() * 1000.0;
            health.last_success = Some(Utc::now());
            health.circuit_open = false;
            health.circuit_open_until = None;
            (health.clone(), was_open)
        };

        if was_open {
            self.announce_closed(stage, "success");
        }
        snapshot
    }

    /// Returns true if the stage is blocked by an open circuit.
    ///
    /// An open circuit whose window has passed is closed here and the call is
    /// let through; the failure count is kept, so one more failure reopens it.
    pub fn check_circuit(&self, stage: &str) -> bool {
        let now = Utc::now();
        let expired = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(stage) else {
                return false;
            };
            let health = &mut entry.health;
            if !health.circuit_open {
                return false;
            }
            match health.circuit_open_until {
                Some(until) if now <= until => return true,
                _ => {
                    health.circuit_open = false;
                    health.circuit_open_until = None;
                    true
                }
            }
        };

        if expired {
            self.announce_closed(stage, "timeout_elapsed");
        }
        false
    }

    /// Returns a copy of the stage's health record.
    #[must_use]
    pub fn health(&self, stage: &str) -> Option<StageHealth> {
        self.entries.lock().get(stage).map(|e| e.health.clone())
    }

    /// Returns a copy of every health record.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, StageHealth> {
        self.entries
            .lock()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.health.clone()))
            .collect()
    }

    /// Clears a stage's health record. Returns true if one existed.
    pub fn reset(&self, stage: &str) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            entries.get_mut(stage).map(|entry| std::mem::take(&mut entry.health))
        };
        match removed {
            Some(old) => {
                if old.circuit_open {
                    self.announce_closed(stage, "reset");
                }
                info!(stage = %stage, "Stage health reset");
                true
            }
            None => false,
        }
    }

    /// Clears every health record, keeping per-stage settings.
    pub fn reset_all(&self) {
        let stages: Vec<String> = self.entries.lock().keys().cloned().collect();
        for stage in stages {
            self.reset(&stage);
        }
    }

    /// Builds a summary of all tracked stages.
    #[must_use]
    pub fn report(&self) -> HealthReport {
        let entries = self.entries.lock();
        let mut report = HealthReport {
            tracked_stages: entries.len(),
            ..HealthReport::default()
        };

        for (name, entry) in entries.iter() {
            let health = &entry.health;
            if health.circuit_open {
                report.open_circuits.push(name.clone());
            }
            if health.failure_count > 0 {
                report.failing_stages.push(name.clone());
            }
            report.total_executions += health.execution_count;
            if let Some(avg) = health.average_duration_ms() {
                report.average_duration_ms.insert(name.clone(), avg);
            }
        }
        report.open_circuits.sort();
        report.failing_stages.sort();
        report
    }

    fn announce_closed(&self, stage: &str, reason: &str) {
        info!(stage = %stage, reason = %reason, "Circuit closed");
        emit_stamped(
            self.event_sink.as_ref(),
            names::CIRCUIT_CLOSED,
            serde_json::json!({ "stage": stage, "reason": reason }),
        );
    }
}

impl Default for StageHealthRegistry {
    fn default() -> Self {
        Self::new(&RecoveryStrategy::default())
    }
}

impl fmt::Debug for StageHealthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageHealthRegistry")
            .field("stages", &self.entries.lock().len())
            .field("threshold", &self.defaults.threshold)
            .finish()
    }
}
