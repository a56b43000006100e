//! Bounded retries with exponential backoff, circuit gating and a timeout watchdog.

use super::{RecoveryStrategy, StageSpec};
use crate::context::{PipelineContext, StageContext};
use crate::core::{FailureKind, StageResult};
use crate::events::{emit_stamped, names, noop_sink, EventSink};
use crate::health::StageHealthRegistry;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Result of a single invocation of the stage runner.
struct AttemptOutcome {
    result: Result<serde_json::Value, String>,
    timed_out: bool,
}

/// Runs a stage until it succeeds, exhausts its retry budget, or trips its circuit.
///
/// Failures never escape as `Err`: every outcome is encoded in the returned
/// [`StageResult`], with [`FailureKind`] distinguishing a permanent failure
/// that should be routed to recovery.
#[derive(Clone)]
pub struct RetryCoordinator {
    registry: Arc<StageHealthRegistry>,
    event_sink: Arc<dyn EventSink>,
}

impl RetryCoordinator {
    /// Creates a coordinator that records outcomes in `registry`.
    #[must_use]
    pub fn new(registry: Arc<StageHealthRegistry>) -> Self {
        Self {
            registry,
            event_sink: noop_sink(),
        }
    }

    /// Sets the sink for attempt and retry events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the health registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<StageHealthRegistry> {
        &self.registry
    }

    /// Executes `spec` under `strategy`.
    ///
    /// Attempt `n > 0` is preceded by a sleep of
    /// `retry_delay_seconds * backoff_multiplier^(n-1)`. The loop stops at the
    /// first success, when the circuit opens, or after `max_retries + 1` attempts.
    pub async fn execute_with_retries(
        &self,
        spec: &StageSpec,
        ctx: Arc<PipelineContext>,
        strategy: &RecoveryStrategy,
    ) -> StageResult {
        let stage = spec.name();
        let started_at = Utc::now();
        let clock = Instant::now();

        self.registry.configure_stage(stage, strategy);
        if self.registry.check_circuit(stage) {
            warn!(stage = %stage, "Circuit open, skipping execution");
            emit_stamped(
                self.event_sink.as_ref(),
                names::STAGE_CIRCUIT_BLOCKED,
                serde_json::json!({ "stage": stage, "attempts": 0 }),
            );
            return StageResult::failed(
                stage,
                started_at,
                clock.elapsed(),
                0,
                FailureKind::CircuitBlocked,
                format!("Circuit open for stage '{stage}'"),
            );
        }

        let max_attempts = strategy.max_attempts();
        let mut any_timed_out = false;
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            let delay = strategy.delay_before_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            debug!(stage = %stage, attempt, "Starting attempt");
            emit_stamped(
                self.event_sink.as_ref(),
                names::STAGE_ATTEMPT,
                serde_json::json!({ "stage": stage, "attempt": attempt }),
            );

            let attempt_clock = Instant::now();
            let outcome = self.run_attempt(spec, &ctx, attempt, strategy).await;
            any_timed_out |= outcome.timed_out;

            match outcome.result {
                Ok(payload) => {
                    let health = self.registry.record_success(stage, attempt_clock.elapsed());
                    let attempts = attempt + 1;
                    debug!(
                        stage = %stage,
                        attempts,
                        execution_count = health.execution_count,
                        "Stage succeeded"
                    );
                    emit_stamped(
                        self.event_sink.as_ref(),
                        names::STAGE_SUCCEEDED,
                        serde_json::json!({
                            "stage": stage,
                            "attempts": attempts,
                            "duration_ms": clock.elapsed().as_secs_f64() * 1000.0,
                        }),
                    );
                    return StageResult::succeeded(stage, started_at, clock.elapsed(), attempts, payload)
                        .with_timed_out(any_timed_out);
                }
                Err(message) => {
                    let health = self.registry.record_failure(stage);
                    if health.circuit_open {
                        let result = StageResult::failed(
                            stage,
                            started_at,
                            clock.elapsed(),
                            attempt + 1,
                            FailureKind::CircuitOpened,
                            message,
                        );
                        return self.permanent_failure(result.with_timed_out(any_timed_out));
                    }
                    last_error = message;

                    let next = attempt + 1;
                    if next < max_attempts {
                        let delay = strategy.delay_before_attempt(next);
                        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                        warn!(
                            stage = %stage,
                            attempt,
                            delay_ms,
                            error = %last_error,
                            "Attempt failed, retrying"
                        );
                        emit_stamped(
                            self.event_sink.as_ref(),
                            names::STAGE_RETRY_SCHEDULED,
                            serde_json::json!({
                                "stage": stage,
                                "attempt": attempt,
                                "next_attempt": next,
                                "delay_ms": delay_ms,
                                "failure": FailureKind::Transient,
                                "error": &last_error,
                            }),
                        );
                    }
                }
            }
        }

        let result = StageResult::failed(
            stage,
            started_at,
            clock.elapsed(),
            max_attempts,
            FailureKind::Exhausted,
            last_error,
        );
        self.permanent_failure(result.with_timed_out(any_timed_out))
    }

    async fn run_attempt(
        &self,
        spec: &StageSpec,
        ctx: &Arc<PipelineContext>,
        attempt: u32,
        strategy: &RecoveryStrategy,
    ) -> AttemptOutcome {
        let runner = Arc::clone(&spec.runner);
        let stage_ctx = StageContext::new(Arc::clone(ctx), spec.name(), attempt);
        let guarded = AssertUnwindSafe(async move { runner.execute(&stage_ctx).await }).catch_unwind();
        let timeout = strategy.timeout();

        if strategy.enforce_timeout {
            return match tokio::time::timeout(timeout, guarded).await {
                Ok(outcome) => AttemptOutcome {
                    result: flatten_attempt(outcome),
                    timed_out: false,
                },
                Err(_) => {
                    self.report_timeout(spec.name(), attempt, timeout, true);
                    AttemptOutcome {
                        result: Err(format!(
                            "Stage '{}' timed out after {:.3}s",
                            spec.name(),
                            timeout.as_secs_f64()
                        )),
                        timed_out: true,
                    }
                }
            };
        }

        let fired = Arc::new(AtomicBool::new(false));
        let watchdog = self.spawn_watchdog(spec.name(), attempt, timeout, Arc::clone(&fired));
        let outcome = guarded.await;
        watchdog.abort();

        AttemptOutcome {
            result: flatten_attempt(outcome),
            timed_out: fired.load(Ordering::SeqCst),
        }
    }

    /// Logs once the attempt outlives its timeout. Never cancels the attempt.
    fn spawn_watchdog(
        &self,
        stage: &str,
        attempt: u32,
        timeout: Duration,
        fired: Arc<AtomicBool>,
    ) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        let stage = stage.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            fired.store(true, Ordering::SeqCst);
            this.report_timeout(&stage, attempt, timeout, false);
        })
    }

    fn report_timeout(&self, stage: &str, attempt: u32, timeout: Duration, enforced: bool) {
        warn!(
            stage = %stage,
            attempt,
            timeout_seconds = timeout.as_secs_f64(),
            enforced,
            "Stage attempt exceeded its timeout"
        );
        emit_stamped(
            self.event_sink.as_ref(),
            names::STAGE_TIMEOUT,
            serde_json::json!({
                "stage": stage,
                "attempt": attempt,
                "timeout_seconds": timeout.as_secs_f64(),
                "enforced": enforced,
            }),
        );
    }

    /// Reports a permanently failed result and hands it back.
    fn permanent_failure(&self, result: StageResult) -> StageResult {
        let error = result.error.as_deref().unwrap_or_default();
        let failure = result.failure.map(|kind| kind.to_string()).unwrap_or_default();
        error!(
            stage = %result.stage,
            attempts = result.attempts,
            failure = %failure,
            error = %error,
            "Stage failed permanently"
        );
        emit_stamped(
            self.event_sink.as_ref(),
            names::STAGE_FAILED,
            serde_json::json!({
                "stage": &result.stage,
                "attempts": result.attempts,
                "failure": result.failure,
                "error": error,
            }),
        );
        result
    }
}

impl std::fmt::Debug for RetryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryCoordinator")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn flatten_attempt(
    outcome: std::thread::Result<anyhow::Result<serde_json::Value>>,
) -> Result<serde_json::Value, String> {
    match outcome {
        Ok(Ok(payload)) => Ok(payload),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(panic) => Err(format!("Stage panicked: {}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
