//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::StageContext;
use crate::stages::Stage;

/// A stage that fails its first `failures` calls, then succeeds.
#[derive(Debug)]
pub struct FlakyStage {
    name: String,
    failures: u32,
    calls: AtomicU32,
}

impl FlakyStage {
    /// Creates a stage that fails `failures` times before succeeding.
    #[must_use]
    pub fn new(name: impl Into<String>, failures: u32) -> Self {
        Self {
            name: name.into(),
            failures,
            calls: AtomicU32::new(0),
        }
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FlakyStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> anyhow::Result<serde_json::Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            anyhow::bail!("transient failure {} of {}", call + 1, self.failures);
        }
        Ok(serde_json::json!({ "stage": ctx.stage_name(), "attempt": ctx.attempt() }))
    }
}

/// A stage that always fails with the same message.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: String,
    calls: AtomicU32,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            calls: AtomicU32::new(0),
        }
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> anyhow::Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!("{}", self.error))
    }
}

/// A stage that always succeeds with a fixed payload.
#[derive(Debug)]
pub struct SuccessStage {
    name: String,
    payload: serde_json::Value,
    calls: AtomicU32,
}

impl SuccessStage {
    /// Creates a success stage with a null payload.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_payload(name, serde_json::Value::Null)
    }

    /// Creates a success stage returning `payload`.
    #[must_use]
    pub fn with_payload(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
            calls: AtomicU32::new(0),
        }
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for SuccessStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> anyhow::Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.payload.clone())
    }
}

/// A stage that takes time to execute.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
}

impl SlowStage {
    /// Creates a new slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }

    /// Creates a slow stage with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(name: impl Into<String>, ms: u64) -> Self {
        Self::new(name, Duration::from_millis(ms))
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> anyhow::Result<serde_json::Value> {
        tokio::time::sleep(self.delay).await;
        Ok(serde_json::Value::Null)
    }
}

/// One recorded invocation of a [`RecordingStage`].
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Stage name from the context.
    pub stage: String,
    /// Zero-based attempt number.
    pub attempt: u32,
    /// When the invocation started.
    pub started: Instant,
    /// When the invocation returned.
    pub finished: Instant,
}

/// Shared log of stage invocations, used to assert ordering and overlap.
#[derive(Debug, Clone, Default)]
pub struct CallRecorder {
    records: Arc<Mutex<Vec<CallRecord>>>,
}

impl CallRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, record: CallRecord) {
        self.records.lock().push(record);
    }

    /// Returns every record in completion order.
    #[must_use]
    pub fn records(&self) -> Vec<CallRecord> {
        self.records.lock().clone()
    }

    /// Returns the records of one stage, ordered by start time.
    #[must_use]
    pub fn records_for(&self, stage: &str) -> Vec<CallRecord> {
        let mut records: Vec<CallRecord> = self
            .records
            .lock()
            .iter()
            .filter(|r| r.stage == stage)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.started);
        records
    }

    /// Returns how often `stage` was invoked.
    #[must_use]
    pub fn call_count(&self, stage: &str) -> usize {
        self.records.lock().iter().filter(|r| r.stage == stage).count()
    }

    /// Returns stage names ordered by start time.
    #[must_use]
    pub fn start_order(&self) -> Vec<String> {
        let mut records = self.records();
        records.sort_by_key(|r| r.started);
        records.into_iter().map(|r| r.stage).collect()
    }

    /// Returns true if every call of `first` returned before any call of `second` started.
    #[must_use]
    pub fn ran_before(&self, first: &str, second: &str) -> bool {
        let first = self.records_for(first);
        let second = self.records_for(second);
        match (first.iter().map(|r| r.finished).max(), second.first()) {
            (Some(done), Some(next)) => done <= next.started,
            _ => false,
        }
    }

    /// Returns true if some call of `a` overlapped in time with some call of `b`.
    #[must_use]
    pub fn overlapped(&self, a: &str, b: &str) -> bool {
        let a = self.records_for(a);
        let b = self.records_for(b);
        a.iter()
            .any(|x| b.iter().any(|y| x.started < y.finished && y.started < x.finished))
    }

    /// Clears all records.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

/// A stage that records the timing of every call into a shared [`CallRecorder`].
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    recorder: CallRecorder,
    delay: Duration,
    fail: bool,
}

impl RecordingStage {
    /// Creates a recording stage that succeeds immediately.
    #[must_use]
    pub fn new(name: impl Into<String>, recorder: CallRecorder) -> Self {
        Self {
            name: name.into(),
            recorder,
            delay: Duration::ZERO,
            fail: false,
        }
    }

    /// Sleeps for `delay` on every call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes every call fail.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> anyhow::Result<serde_json::Value> {
        let started = Instant::now();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.recorder.push(CallRecord {
            stage: ctx.stage_name().to_string(),
            attempt: ctx.attempt(),
            started,
            finished: Instant::now(),
        });

        if self.fail {
            anyhow::bail!("{} failed on attempt {}", self.name, ctx.attempt());
        }
        Ok(serde_json::json!({ "stage": ctx.stage_name() }))
    }
}

/// A stage that panics on every call.
#[derive(Debug)]
pub struct PanickingStage {
    name: String,
}

impl PanickingStage {
    /// Creates a new panicking stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> anyhow::Result<serde_json::Value> {
        panic!("stage '{}' panicked", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PipelineContext;

    fn test_context(name: &str, attempt: u32) -> StageContext {
        StageContext::new(Arc::new(PipelineContext::new()), name, attempt)
    }

    #[tokio::test]
    async fn test_flaky_stage() {
        let stage = FlakyStage::new("flaky", 2);
        assert!(stage.execute(&test_context("flaky", 0)).await.is_err());
        assert!(stage.execute(&test_context("flaky", 1)).await.is_err());
        let payload = stage.execute(&test_context("flaky", 2)).await.unwrap();
        assert_eq!(payload["attempt"], 2);
        assert_eq!(stage.calls(), 3);
    }

    #[tokio::test]
    async fn test_failing_stage() {
        let stage = FailingStage::new("fail", "test error");
        let err = stage.execute(&test_context("fail", 0)).await.unwrap_err();
        assert_eq!(err.to_string(), "test error");
        assert_eq!(stage.calls(), 1);
    }

    #[tokio::test]
    async fn test_success_stage_with_payload() {
        let stage = SuccessStage::with_payload("ok", serde_json::json!({"rows": 3}));
        let payload = stage.execute(&test_context("ok", 0)).await.unwrap();
        assert_eq!(payload["rows"], 3);
    }

    #[tokio::test]
    async fn test_slow_stage() {
        let stage = SlowStage::with_delay_ms("slow", 10);
        let start = Instant::now();
        stage.execute(&test_context("slow", 0)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_recording_stage_order() {
        let recorder = CallRecorder::new();
        let first = RecordingStage::new("first", recorder.clone());
        let second = RecordingStage::new("second", recorder.clone()).failing();

        first.execute(&test_context("first", 0)).await.unwrap();
        assert!(second.execute(&test_context("second", 0)).await.is_err());

        assert_eq!(recorder.start_order(), vec!["first".to_string(), "second".to_string()]);
        assert!(recorder.ran_before("first", "second"));
        assert!(!recorder.ran_before("second", "first"));
        assert_eq!(recorder.call_count("second"), 1);

        recorder.clear();
        assert!(recorder.records().is_empty());
    }

    #[tokio::test]
    async fn test_recorder_detects_overlap() {
        let recorder = CallRecorder::new();
        let a = RecordingStage::new("a", recorder.clone()).with_delay(Duration::from_millis(30));
        let b = RecordingStage::new("b", recorder.clone()).with_delay(Duration::from_millis(30));

        let ctx_a = test_context("a", 0);
        let ctx_b = test_context("b", 0);
        let (ra, rb) = tokio::join!(a.execute(&ctx_a), b.execute(&ctx_b));
        assert!(ra.is_ok() && rb.is_ok());
        assert!(recorder.overlapped("a", "b"));
    }
}
