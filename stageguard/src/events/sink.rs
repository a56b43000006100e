//! Event sinks.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::Level;

/// An emitted event: its type name and optional payload.
pub type RecordedEvent = (String, Option<Value>);

/// Receives engine events.
///
/// The engine only calls [`try_emit`](EventSink::try_emit), often from worker
/// tasks; implementations must not block and must not panic.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event, awaiting any I/O the sink performs.
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Emits an event without waiting. Failures are swallowed.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes events to `tracing` at a fixed level.
///
/// The `stage` and `workflow` payload fields, when present, are lifted into
/// structured fields.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a sink logging at debug level.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Returns the level events are logged at.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    fn log(&self, event_type: &str, data: Option<&Value>) {
        let field = |key: &str| {
            data.and_then(|d| d.get(key))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let stage = field("stage");
        let workflow = field("workflow");
        let payload = data.map(Value::to_string).unwrap_or_default();

        macro_rules! at {
            ($mac:ident) => {
                tracing::$mac!(event = event_type, stage = %stage, workflow = %workflow, payload = %payload, "engine event")
            };
        }
        match self.level {
            Level::TRACE => at!(trace),
            Level::DEBUG => at!(debug),
            Level::INFO => at!(info),
            Level::WARN => at!(warn),
            _ => at!(error),
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.log(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.log(event_type, data.as_ref());
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything collected so far.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drops everything collected so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Events whose type starts with `prefix`, e.g. `"stage."`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(event_type, _)| event_type.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Payloads of events whose type is exactly `event_type`.
    #[must_use]
    pub fn payloads(&self, event_type: &str) -> Vec<Value> {
        self.events
            .lock()
            .iter()
            .filter(|(t, _)| t == event_type)
            .filter_map(|(_, data)| data.clone())
            .collect()
    }

    /// Event type names in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    fn record(&self, event_type: &str, data: Option<Value>) {
        self.events.lock().push((event_type.to_string(), data));
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_noop_sink_accepts_everything() {
        let sink = NoOpEventSink;
        sink.emit("pipeline.started", None).await;
        sink.try_emit("pipeline.completed", Some(json!({"stages": 3})));
    }

    #[tokio::test]
    async fn test_logging_sink_levels() {
        for level in [Level::TRACE, Level::DEBUG, Level::INFO, Level::WARN, Level::ERROR] {
            let sink = LoggingEventSink::new(level);
            assert_eq!(sink.level(), level);
            sink.emit("circuit.opened", Some(json!({"stage": "s"}))).await;
            sink.try_emit("workflow.started", Some(json!({"workflow": "w"})));
            sink.try_emit("circuit.closed", None);
        }
        assert_eq!(LoggingEventSink::default().level(), Level::INFO);
    }

    #[tokio::test]
    async fn test_collecting_sink_queries() {
        let sink = CollectingEventSink::new();
        sink.emit("stage.attempt", None).await;
        sink.try_emit("stage.failed", Some(json!({"stage": "a"})));
        sink.try_emit("workflow.started", None);

        assert_eq!(sink.len(), 3);
        assert_eq!(
            sink.event_types(),
            vec!["stage.attempt", "stage.failed", "workflow.started"]
        );
        assert_eq!(sink.events_of_type("stage.").len(), 2);
        assert_eq!(sink.payloads("stage.failed"), vec![json!({"stage": "a"})]);
        assert!(sink.payloads("stage.attempt").is_empty());

        sink.clear();
        assert!(sink.is_empty());
    }
}
