//! Event sink system for observability.
//!
//! Health transitions, retry attempts, issue changes and workflow executions
//! are published to an injected [`EventSink`]. The engine works unchanged with
//! a [`NoOpEventSink`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

use crate::utils::iso_timestamp;
use std::sync::Arc;

/// Event type names emitted by the engine.
pub mod names {
    /// A pipeline run started.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// A pipeline run finished every level.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A pipeline run stopped before its last level.
    pub const PIPELINE_HALTED: &str = "pipeline.halted";
    /// A level started executing.
    pub const LEVEL_STARTED: &str = "level.started";
    /// Every stage in a level returned.
    pub const LEVEL_COMPLETED: &str = "level.completed";
    /// A stage attempt is about to run.
    pub const STAGE_ATTEMPT: &str = "stage.attempt";
    /// A failed attempt will be retried after a delay.
    pub const STAGE_RETRY_SCHEDULED: &str = "stage.retry_scheduled";
    /// A stage succeeded.
    pub const STAGE_SUCCEEDED: &str = "stage.succeeded";
    /// A stage failed permanently.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// An attempt exceeded its timeout.
    pub const STAGE_TIMEOUT: &str = "stage.timeout";
    /// A stage was rejected by its open circuit.
    pub const STAGE_CIRCUIT_BLOCKED: &str = "stage.circuit_blocked";
    /// A circuit transitioned to open.
    pub const CIRCUIT_OPENED: &str = "circuit.opened";
    /// A circuit transitioned to closed.
    pub const CIRCUIT_CLOSED: &str = "circuit.closed";
    /// An issue became active.
    pub const ISSUE_REGISTERED: &str = "issue.registered";
    /// An active issue was resolved.
    pub const ISSUE_RESOLVED: &str = "issue.resolved";
    /// A recovery workflow started.
    pub const WORKFLOW_STARTED: &str = "workflow.started";
    /// A workflow action failed after its own retries.
    pub const WORKFLOW_ACTION_FAILED: &str = "workflow.action_failed";
    /// A rollback handler failed.
    pub const WORKFLOW_ROLLBACK_FAILED: &str = "workflow.rollback_failed";
    /// A workflow finished successfully.
    pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
    /// A workflow failed.
    pub const WORKFLOW_FAILED: &str = "workflow.failed";
}

/// Returns the default sink used when none is injected.
#[must_use]
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpEventSink)
}

/// Emits an event, stamping the payload with the current timestamp.
///
/// `data` is expected to be a JSON object; other values are wrapped under `value`.
pub fn emit_stamped(sink: &dyn EventSink, event_type: &str, data: serde_json::Value) {
    let payload = match data {
        serde_json::Value::Object(mut map) => {
            map.insert("timestamp".to_string(), serde_json::json!(iso_timestamp()));
            serde_json::Value::Object(map)
        }
        other => serde_json::json!({ "value": other, "timestamp": iso_timestamp() }),
    };
    sink.try_emit(event_type, Some(payload));
}
