//! Testing utilities for stageguard pipelines.
//!
//! This module provides:
//! - Mock stages (flaky, failing, slow, recording, panicking)
//! - Assertions for stage results and call ordering
//! - Context, strategy and stage-graph fixtures

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_attempts, assert_failed, assert_failure_kind, assert_not_called, assert_overlapped,
    assert_ran_before, assert_success,
};
pub use fixtures::{
    chain_specs, context_with_sink, fast_strategy, layered_specs, test_context,
    test_context_with_data,
};
pub use mocks::{
    CallRecord, CallRecorder, FailingStage, FlakyStage, PanickingStage, RecordingStage, SlowStage,
    SuccessStage,
};
