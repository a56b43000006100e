//! End-to-end scenarios across scheduling, retries, health and recovery.

#[cfg(test)]
mod tests {
    use crate::context::{ContextBag, PipelineContext, StageContext};
    use crate::core::FailureKind;
    use crate::events::{names, CollectingEventSink};
    use crate::health::StageHealthRegistry;
    use crate::pipeline::{
        ConcurrentLevelExecutor, EngineConfig, PipelineBuilder, RecoveryStrategy, StageSpec,
    };
    use crate::recovery::builtin::circuit_reset_workflow;
    use crate::recovery::{IssueType, RecoveryWorkflowEngine, Workflow, WorkflowAction};
    use crate::stages::{FnStage, Stage};
    use crate::testing::{
        assert_attempts, assert_failure_kind, assert_success, fast_strategy, FailingStage,
        FlakyStage, SuccessStage,
    };
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn breaker_strategy(threshold: u32) -> RecoveryStrategy {
        fast_strategy()
            .with_max_retries(0)
            .with_circuit_breaker(threshold, 60.0)
    }

    struct Harness {
        executor: ConcurrentLevelExecutor,
        registry: Arc<StageHealthRegistry>,
        engine: Arc<RecoveryWorkflowEngine>,
        sink: Arc<CollectingEventSink>,
    }

    fn harness(config: EngineConfig) -> Harness {
        let sink = Arc::new(CollectingEventSink::new());
        let registry = Arc::new(
            StageHealthRegistry::new(&config.default_strategy).with_event_sink(sink.clone()),
        );
        let engine = Arc::new(RecoveryWorkflowEngine::new().with_event_sink(sink.clone()));
        let executor = ConcurrentLevelExecutor::new(config, Arc::clone(&registry))
            .with_event_sink(sink.clone())
            .with_recovery(Arc::clone(&engine));
        Harness {
            executor,
            registry,
            engine,
            sink,
        }
    }

    #[test]
    fn test_config_file_drives_execution() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "default_strategy": {{ "max_retries": 0, "retry_delay_seconds": 0.001 }},
                "stage_strategies": {{
                    "fetch": {{ "max_retries": 2, "retry_delay_seconds": 0.001 }}
                }},
                "max_concurrency": 2
            }}"#
        )
        .unwrap();
        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_concurrency, 2);

        let h = harness(config);
        let fetch = Arc::new(FlakyStage::new("fetch", 2));
        let stages = vec![
            StageSpec::new("fetch", fetch.clone()),
            StageSpec::new("store", Arc::new(SuccessStage::new("store"))).with_dependency("fetch"),
        ];

        let run = tokio_test::block_on(
            h.executor
                .execute_pipeline(&stages, Arc::new(PipelineContext::new())),
        )
        .unwrap();

        assert!(run.success());
        let fetch_result = run.result("fetch").unwrap();
        assert_success(fetch_result);
        assert_attempts(fetch_result, 3);
        assert_eq!(
            fetch_result.payload.as_ref().map(|p| p["attempt"].clone()),
            Some(serde_json::json!(2))
        );
        assert_eq!(fetch.calls(), 3);
        assert_eq!(h.sink.payloads(names::STAGE_RETRY_SCHEDULED).len(), 2);
    }

    #[tokio::test]
    async fn test_health_report_after_runs() {
        let h = harness(EngineConfig::new().with_default_strategy(fast_strategy()));
        let stages = PipelineBuilder::named("report")
            .stage("a", Arc::new(SuccessStage::new("a")), &[])
            .and_then(|b| b.stage("b", Arc::new(SuccessStage::new("b")), &[]))
            .and_then(|b| b.stage("c", Arc::new(SuccessStage::new("c")), &["a", "b"]))
            .and_then(PipelineBuilder::build)
            .unwrap();

        for _ in 0..3 {
            let run = h
                .executor
                .execute_pipeline(&stages, Arc::new(PipelineContext::new().with_pipeline_name("report")))
                .await
                .unwrap();
            assert!(run.success());
            assert_eq!(run.pipeline_name.as_deref(), Some("report"));
        }

        let report = h.registry.report();
        assert!(report.is_healthy());
        assert_eq!(report.tracked_stages, 3);
        assert_eq!(report.total_executions, 9);
        assert_eq!(report.average_duration_ms.len(), 3);
        assert!(h.engine.active_issues().is_empty());
    }

    #[tokio::test]
    async fn test_circuit_opens_across_runs_and_blocks() {
        let h = harness(EngineConfig::new().with_default_strategy(breaker_strategy(2)));
        let flaky = Arc::new(FailingStage::new("upload", "remote unavailable"));
        let stages = vec![StageSpec::new("upload", flaky.clone())];

        let first = h
            .executor
            .execute_pipeline(&stages, Arc::new(PipelineContext::new()))
            .await
            .unwrap();
        assert_failure_kind(first.result("upload").unwrap(), FailureKind::Exhausted);
        assert!(h.engine.is_active(IssueType::StageFailed));

        let second = h
            .executor
            .execute_pipeline(&stages, Arc::new(PipelineContext::new()))
            .await
            .unwrap();
        assert_failure_kind(second.result("upload").unwrap(), FailureKind::CircuitOpened);
        assert!(h.engine.is_active(IssueType::CircuitBreakerOpen));
        assert_eq!(h.sink.payloads(names::CIRCUIT_OPENED).len(), 1);

        let third = h
            .executor
            .execute_pipeline(&stages, Arc::new(PipelineContext::new()))
            .await
            .unwrap();
        let blocked = third.result("upload").unwrap();
        assert_failure_kind(blocked, FailureKind::CircuitBlocked);
        assert_attempts(blocked, 0);
        assert_eq!(flaky.calls(), 2);
        assert_eq!(h.registry.report().open_circuits, vec!["upload"]);

        let issue = h
            .engine
            .active_issues()
            .into_iter()
            .find(|i| i.issue_type == IssueType::CircuitBreakerOpen)
            .unwrap();
        assert_eq!(issue.metadata_str("stage"), Some("upload"));
        assert_eq!(issue.metadata["failure"], "circuit_blocked");
    }

    #[tokio::test]
    async fn test_auto_recovery_resets_circuit() {
        let config = EngineConfig::new()
            .with_default_strategy(breaker_strategy(1))
            .with_auto_recover(true);
        let h = harness(config);
        h.engine
            .register_workflow(circuit_reset_workflow(Arc::clone(&h.registry)))
            .unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let stage = FnStage::new("sync", move |_ctx: StageContext| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("first call fails");
                }
                Ok(serde_json::json!("synced"))
            }
        });
        let stages = vec![StageSpec::new(stage.name().to_string(), Arc::new(stage))];

        let first = h
            .executor
            .execute_pipeline(&stages, Arc::new(PipelineContext::new()))
            .await
            .unwrap();
        assert_failure_kind(first.result("sync").unwrap(), FailureKind::CircuitOpened);

        assert!(!h.registry.check_circuit("sync"));
        assert!(!h.engine.is_active(IssueType::CircuitBreakerOpen));
        let history = h.engine.execution_history();
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
        assert_eq!(history[0].actions_taken, vec!["reset_stage_health"]);

        let second = h
            .executor
            .execute_pipeline(&stages, Arc::new(PipelineContext::new()))
            .await
            .unwrap();
        assert!(second.success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_routing_disabled_registers_nothing() {
        let config = EngineConfig::new()
            .with_default_strategy(breaker_strategy(5))
            .with_route_permanent_failures(false);
        let h = harness(config);
        let stages = vec![StageSpec::new("x", Arc::new(FailingStage::new("x", "nope")))];

        let run = h
            .executor
            .execute_pipeline(&stages, Arc::new(PipelineContext::new()))
            .await
            .unwrap();

        assert_eq!(run.failed_stages(), vec!["x"]);
        assert!(h.engine.active_issues().is_empty());
        assert!(h.sink.payloads(names::ISSUE_REGISTERED).is_empty());
    }

    #[tokio::test]
    async fn test_stage_failure_workflow_with_rollback() {
        let config = EngineConfig::new()
            .with_default_strategy(breaker_strategy(10))
            .with_auto_recover(true);
        let h = harness(config);

        let rollbacks = Arc::new(AtomicU32::new(0));
        let rollback_counter = Arc::clone(&rollbacks);
        let workflow = Workflow::new("failover", IssueType::StageFailed)
            .with_action(
                WorkflowAction::new("switch_region", |ctx: Arc<ContextBag>| async move {
                    ctx.set("region", serde_json::json!("secondary"));
                    Ok(true)
                })
                .with_rollback(move |_ctx: Arc<ContextBag>| {
                    let counter = Arc::clone(&rollback_counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .with_action(WorkflowAction::new("warm_cache", |_ctx: Arc<ContextBag>| async move {
                Ok(false)
            }));
        h.engine.register_workflow(workflow).unwrap();

        let stages = vec![StageSpec::new("ingest", Arc::new(FailingStage::new("ingest", "disk full")))];
        h.executor
            .execute_pipeline(&stages, Arc::new(PipelineContext::new()))
            .await
            .unwrap();

        let history = h.engine.execution_history();
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
        assert_eq!(history[0].actions_taken, vec!["switch_region", "warm_cache"]);
        assert_eq!(history[0].rolled_back, vec!["switch_region"]);
        assert_eq!(history[0].metadata["stage"], "ingest");
        assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
        assert!(h.engine.is_active(IssueType::StageFailed));
    }
}
