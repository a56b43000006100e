//! Test assertions for stage results and call recordings.

use super::CallRecorder;
use crate::core::{FailureKind, StageResult};

/// Asserts that the result indicates success.
#[track_caller]
pub fn assert_success(result: &StageResult) {
    assert!(
        result.is_success(),
        "Expected '{}' to succeed, got {:?}: {:?}",
        result.stage,
        result.failure,
        result.error
    );
}

/// Asserts that the result indicates failure.
#[track_caller]
pub fn assert_failed(result: &StageResult) {
    assert!(
        result.is_failure(),
        "Expected '{}' to fail, but it succeeded",
        result.stage
    );
}

/// Asserts that the result failed with the given kind.
#[track_caller]
pub fn assert_failure_kind(result: &StageResult, expected: FailureKind) {
    assert_eq!(
        result.failure,
        Some(expected),
        "Expected '{}' to fail with {expected}, got {:?}",
        result.stage,
        result.failure
    );
}

/// Asserts the number of attempts made.
#[track_caller]
pub fn assert_attempts(result: &StageResult, expected: u32) {
    assert_eq!(
        result.attempts, expected,
        "Expected '{}' to make {expected} attempts, got {}",
        result.stage, result.attempts
    );
}

/// Asserts that every call of `first` finished before `second` started.
#[track_caller]
pub fn assert_ran_before(recorder: &CallRecorder, first: &str, second: &str) {
    assert!(
        recorder.ran_before(first, second),
        "Expected '{first}' to finish before '{second}' started; order: {:?}",
        recorder.start_order()
    );
}

/// Asserts that `a` and `b` ran at the same time at least once.
#[track_caller]
pub fn assert_overlapped(recorder: &CallRecorder, a: &str, b: &str) {
    assert!(
        recorder.overlapped(a, b),
        "Expected '{a}' and '{b}' to run concurrently"
    );
}

/// Asserts that `stage` was never invoked.
#[track_caller]
pub fn assert_not_called(recorder: &CallRecorder, stage: &str) {
    assert_eq!(
        recorder.call_count(stage),
        0,
        "Expected '{stage}' never to run"
    );
}
