//! Level-by-level pipeline execution.
//!
//! Levels run strictly in sequence. Stages within a level run concurrently on
//! a bounded set of tokio tasks, and the executor waits for all of them
//! before deciding whether to continue: any failure in a level stops
//! scheduling, but results for everything that ran are kept.

use super::{
    DependencyGraphScheduler, EngineConfig, PipelineRun, RecoveryStrategy, RetryCoordinator,
    StageSpec, HALT_CANCELLED,
};
use crate::context::{ContextBag, PipelineContext};
use crate::core::{FailureKind, StageResult};
use crate::errors::PipelineError;
use crate::events::{emit_stamped, names, noop_sink, EventSink};
use crate::health::StageHealthRegistry;
use crate::recovery::{IssueType, RecoveryWorkflowEngine};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Executes stage sets level by level.
pub struct ConcurrentLevelExecutor {
    config: EngineConfig,
    scheduler: DependencyGraphScheduler,
    coordinator: RetryCoordinator,
    recovery: Option<Arc<RecoveryWorkflowEngine>>,
    event_sink: Arc<dyn EventSink>,
}

impl ConcurrentLevelExecutor {
    /// Creates an executor recording stage health in `registry`.
    #[must_use]
    pub fn new(config: EngineConfig, registry: Arc<StageHealthRegistry>) -> Self {
        Self {
            config,
            scheduler: DependencyGraphScheduler::new(),
            coordinator: RetryCoordinator::new(registry),
            recovery: None,
            event_sink: noop_sink(),
        }
    }

    /// Sets the sink for pipeline, level and stage events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.coordinator = self.coordinator.with_event_sink(Arc::clone(&sink));
        self.event_sink = sink;
        self
    }

    /// Routes permanent stage failures to `engine` as issues.
    #[must_use]
    pub fn with_recovery(mut self, engine: Arc<RecoveryWorkflowEngine>) -> Self {
        self.recovery = Some(engine);
        self
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the health registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<StageHealthRegistry> {
        self.coordinator.registry()
    }

    /// Resolves the strategy for a stage: its own override, then the
    /// configured per-stage strategy, then the default.
    #[must_use]
    pub fn strategy_for<'a>(&'a self, spec: &'a StageSpec) -> &'a RecoveryStrategy {
        spec.strategy
            .as_ref()
            .unwrap_or_else(|| self.config.strategy_for(spec.name()))
    }

    /// Schedules and runs `stages`.
    ///
    /// # Errors
    ///
    /// Only structural problems (invalid configuration, bad stage graph) are
    /// returned as `Err`. Stage failures are reported in the [`PipelineRun`].
    pub async fn execute_pipeline(
        &self,
        stages: &[StageSpec],
        ctx: Arc<PipelineContext>,
    ) -> Result<PipelineRun, PipelineError> {
        self.config.validate()?;
        let plan = self.scheduler.schedule(stages)?;
        let specs: HashMap<&str, &StageSpec> = stages.iter().map(|s| (s.name(), s)).collect();

        let clock = Instant::now();
        let mut run = PipelineRun::new(
            ctx.run_id(),
            ctx.pipeline_name().map(str::to_string),
            plan.levels().to_vec(),
        );

        info!(
            run_id = %run.run_id,
            stages = stages.len(),
            levels = plan.level_count(),
            "Pipeline started"
        );
        emit_stamped(
            self.event_sink.as_ref(),
            names::PIPELINE_STARTED,
            serde_json::json!({
                "run_id": run.run_id.to_string(),
                "pipeline": &run.pipeline_name,
                "levels": plan.levels(),
            }),
        );

        for (index, level) in plan.levels().iter().enumerate() {
            if ctx.is_cancelled() {
                warn!(
                    run_id = %run.run_id,
                    level = index,
                    reason = %ctx.cancel_token().reason().unwrap_or_default(),
                    "Pipeline cancelled"
                );
                run.halt(index, HALT_CANCELLED);
                break;
            }

            emit_stamped(
                self.event_sink.as_ref(),
                names::LEVEL_STARTED,
                serde_json::json!({ "level": index, "stages": level }),
            );

            let results = self.execute_level(level, &specs, &ctx).await;
            let failed: Vec<String> = results
                .iter()
                .filter(|r| r.is_failure())
                .map(|r| r.stage.clone())
                .collect();

            for result in results {
                self.route_failure(&result, &ctx).await;
                run.results.insert(result.stage.clone(), result);
            }
            run.levels_completed = index + 1;

            emit_stamped(
                self.event_sink.as_ref(),
                names::LEVEL_COMPLETED,
                serde_json::json!({
                    "level": index,
                    "stages": level,
                    "failed": &failed,
                }),
            );

            if !failed.is_empty() {
                run.halt(index, format!("Level {index} failed: {}", failed.join(", ")));
                break;
            }
        }

        run.duration_ms = clock.elapsed().as_secs_f64() * 1000.0;
        self.announce_finish(&run);
        Ok(run)
    }

    async fn execute_level(
        &self,
        level: &[String],
        specs: &HashMap<&str, &StageSpec>,
        ctx: &Arc<PipelineContext>,
    ) -> Vec<StageResult> {
        let jobs: Vec<(StageSpec, RecoveryStrategy)> = level
            .iter()
            .filter_map(|name| specs.get(name.as_str()))
            .map(|spec| ((*spec).clone(), self.strategy_for(spec).clone()))
            .collect();

        if let [(spec, strategy)] = jobs.as_slice() {
            return vec![
                self.coordinator
                    .execute_with_retries(spec, Arc::clone(ctx), strategy)
                    .await,
            ];
        }

        let workers = jobs.into_iter().map(|(spec, strategy)| {
            let coordinator = self.coordinator.clone();
            let ctx = Arc::clone(ctx);
            async move {
                let stage = spec.name.clone();
                let started_at = Utc::now();
                let task = tokio::spawn(async move {
                    coordinator.execute_with_retries(&spec, ctx, &strategy).await
                });
                match task.await {
                    Ok(result) => result,
                    Err(err) => {
                        error!(stage = %stage, error = %err, "Stage worker aborted");
                        StageResult::failed(
                            stage,
                            started_at,
                            Duration::ZERO,
                            0,
                            FailureKind::Exhausted,
                            format!("Stage worker aborted: {err}"),
                        )
                    }
                }
            }
        });

        let mut results: Vec<StageResult> = stream::iter(workers)
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;
        results.sort_by(|a, b| a.stage.cmp(&b.stage));
        results
    }

    async fn route_failure(&self, result: &StageResult, ctx: &PipelineContext) {
        let Some(engine) = &self.recovery else {
            return;
        };
        if !self.config.route_permanent_failures {
            return;
        }
        let Some(issue_type) = IssueType::for_stage_result(result) else {
            return;
        };

        let mut metadata = HashMap::new();
        metadata.insert("stage".to_string(), serde_json::json!(&result.stage));
        metadata.insert("error".to_string(), serde_json::json!(&result.error));
        metadata.insert("attempts".to_string(), serde_json::json!(result.attempts));
        metadata.insert("failure".to_string(), serde_json::json!(result.failure));
        metadata.insert("run_id".to_string(), serde_json::json!(ctx.run_id().to_string()));

        engine.register_issue(issue_type, metadata.clone());

        if self.config.auto_recover {
            let recovery_ctx = Arc::new(ContextBag::from_data(metadata));
            let recovered = engine.execute_workflow(issue_type, recovery_ctx).await;
            info!(
                stage = %result.stage,
                issue_type = %issue_type,
                recovered,
                "Automatic recovery finished"
            );
        }
    }

    fn announce_finish(&self, run: &PipelineRun) {
        if let Some(level) = run.halted_at_level {
            warn!(
                run_id = %run.run_id,
                level,
                reason = run.halt_reason.as_deref().unwrap_or_default(),
                failed = ?run.failed_stages(),
                duration_ms = run.duration_ms,
                "Pipeline halted"
            );
            emit_stamped(
                self.event_sink.as_ref(),
                names::PIPELINE_HALTED,
                serde_json::json!({
                    "run_id": run.run_id.to_string(),
                    "level": level,
                    "reason": &run.halt_reason,
                    "failed": run.failed_stages(),
                    "succeeded": run.succeeded_stages(),
                    "duration_ms": run.duration_ms,
                }),
            );
        } else {
            info!(
                run_id = %run.run_id,
                stages = run.results.len(),
                duration_ms = run.duration_ms,
                "Pipeline completed"
            );
            emit_stamped(
                self.event_sink.as_ref(),
                names::PIPELINE_COMPLETED,
                serde_json::json!({
                    "run_id": run.run_id.to_string(),
                    "stages": run.results.len(),
                    "duration_ms": run.duration_ms,
                }),
            );
        }
    }
}

impl fmt::Debug for ConcurrentLevelExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentLevelExecutor")
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .field("recovery", &self.recovery.is_some())
            .finish_non_exhaustive()
    }
}
