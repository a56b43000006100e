//! Test fixtures for pipeline testing.

use std::sync::Arc;

use crate::context::{ContextBag, PipelineContext};
use crate::events::CollectingEventSink;
use crate::pipeline::{RecoveryStrategy, StageSpec};
use crate::stages::NoOpStage;

/// A strategy with millisecond backoff and a generous circuit threshold.
#[must_use]
pub fn fast_strategy() -> RecoveryStrategy {
    RecoveryStrategy::new()
        .with_max_retries(3)
        .with_retry_delay(0.001)
        .with_backoff_multiplier(2.0)
        .with_timeout(5.0)
        .with_circuit_breaker(100, 60.0)
}

/// Creates an empty pipeline context.
#[must_use]
pub fn test_context() -> Arc<PipelineContext> {
    Arc::new(PipelineContext::new().with_pipeline_name("test"))
}

/// Creates a pipeline context seeded with `data`.
#[must_use]
pub fn test_context_with_data(data: &[(&str, serde_json::Value)]) -> Arc<PipelineContext> {
    let bag = ContextBag::new();
    for (key, value) in data {
        bag.set(*key, value.clone());
    }
    Arc::new(PipelineContext::with_data(bag).with_pipeline_name("test"))
}

/// Creates a pipeline context whose stage events land in a collecting sink.
#[must_use]
pub fn context_with_sink() -> (Arc<PipelineContext>, Arc<CollectingEventSink>) {
    let sink = Arc::new(CollectingEventSink::new());
    let ctx = PipelineContext::new()
        .with_pipeline_name("test")
        .with_event_sink(sink.clone());
    (Arc::new(ctx), sink)
}

/// A serial chain `stage_0 -> stage_1 -> ...` of no-op stages.
#[must_use]
pub fn chain_specs(count: usize) -> Vec<StageSpec> {
    (0..count)
        .map(|i| {
            let name = format!("stage_{i}");
            let spec = StageSpec::new(&name, Arc::new(NoOpStage::new(&name)));
            if i == 0 {
                spec
            } else {
                spec.with_dependency(format!("stage_{}", i - 1))
            }
        })
        .collect()
}

/// `layers` levels of `width` no-op stages; each stage depends on every stage
/// of the previous layer.
#[must_use]
pub fn layered_specs(layers: usize, width: usize) -> Vec<StageSpec> {
    let mut specs = Vec::with_capacity(layers * width);
    for layer in 0..layers {
        for i in 0..width {
            let name = format!("l{layer}_s{i}");
            let mut spec = StageSpec::new(&name, Arc::new(NoOpStage::new(&name)));
            if layer > 0 {
                spec = spec.with_dependencies((0..width).map(|j| format!("l{}_s{j}", layer - 1)));
            }
            specs.push(spec);
        }
    }
    specs
}
