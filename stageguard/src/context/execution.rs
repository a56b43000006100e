//! Pipeline and stage execution contexts.

use super::ContextBag;
use crate::cancellation::CancellationToken;
use crate::events::{noop_sink, EventSink};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// The shared context for one pipeline run.
pub struct PipelineContext {
    run_id: Uuid,
    pipeline_name: Option<String>,
    /// Arbitrary key/value data shared by every stage.
    pub data: Arc<ContextBag>,
    event_sink: Arc<dyn EventSink>,
    cancel_token: Arc<CancellationToken>,
}

impl PipelineContext {
    /// Creates a new pipeline context with a fresh run id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline_name: None,
            data: Arc::new(ContextBag::new()),
            event_sink: noop_sink(),
            cancel_token: Arc::new(CancellationToken::new()),
        }
    }

    /// Creates a context seeded with existing data.
    #[must_use]
    pub fn with_data(data: ContextBag) -> Self {
        Self {
            data: Arc::new(data),
            ..Self::new()
        }
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = Some(name.into());
        self
    }

    /// Sets the event sink stages may use for their own events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline_name(&self) -> Option<&str> {
        self.pipeline_name.as_deref()
    }

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel_token
    }

    /// Requests that no further levels be scheduled.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancel_token.cancel(reason);
    }

    /// Checks if the context is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("run_id", &self.run_id)
            .field("pipeline_name", &self.pipeline_name)
            .field("data_keys", &self.data.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// The view of the run handed to a stage for one attempt.
#[derive(Debug, Clone)]
pub struct StageContext {
    pipeline: Arc<PipelineContext>,
    stage_name: String,
    attempt: u32,
}

impl StageContext {
    /// Creates a new stage context.
    #[must_use]
    pub fn new(pipeline: Arc<PipelineContext>, stage_name: impl Into<String>, attempt: u32) -> Self {
        Self {
            pipeline,
            stage_name: stage_name.into(),
            attempt,
        }
    }

    /// Returns the declared stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the zero-based attempt number.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the shared key/value data.
    #[must_use]
    pub fn data(&self) -> &ContextBag {
        &self.pipeline.data
    }

    /// Returns the pipeline context.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<PipelineContext> {
        &self.pipeline
    }

    /// Emits an event through the pipeline's sink.
    pub fn try_emit_event(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.pipeline.event_sink.try_emit(event_type, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;

    #[test]
    fn test_pipeline_context_defaults() {
        let ctx = PipelineContext::new().with_pipeline_name("nightly");
        assert_eq!(ctx.pipeline_name(), Some("nightly"));
        assert!(!ctx.is_cancelled());
        assert!(ctx.data.is_empty());
    }

    #[test]
    fn test_cancel() {
        let ctx = PipelineContext::new();
        ctx.cancel("shutdown");
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.cancel_token().reason().as_deref(), Some("shutdown"));
    }

    #[test]
    fn test_stage_context_shares_data() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = Arc::new(PipelineContext::new().with_event_sink(sink.clone()));
        let stage_ctx = StageContext::new(ctx.clone(), "lint", 2);

        stage_ctx.data().set("lint.ok", serde_json::json!(true));
        stage_ctx.try_emit_event("lint.custom", None);

        assert_eq!(stage_ctx.stage_name(), "lint");
        assert_eq!(stage_ctx.attempt(), 2);
        assert_eq!(ctx.data.get("lint.ok"), Some(serde_json::json!(true)));
        assert_eq!(sink.len(), 1);
    }
}
