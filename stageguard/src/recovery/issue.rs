//! Systemic issue categories and issue records.

use crate::core::{FailureKind, StageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A category of systemic problem that a recovery workflow can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// A stage failed permanently.
    StageFailed,
    /// A stage kept exceeding its timeout.
    TimeoutExceeded,
    /// A service the pipeline depends on is unreachable.
    ExternalDependencyUnavailable,
    /// A stage's circuit breaker is open.
    CircuitBreakerOpen,
    /// Memory, disk, quota or similar ran out.
    ResourceExhausted,
    /// Input or output validation failed.
    ValidationFailed,
}

impl IssueType {
    /// Every issue type, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::StageFailed,
        Self::TimeoutExceeded,
        Self::ExternalDependencyUnavailable,
        Self::CircuitBreakerOpen,
        Self::ResourceExhausted,
        Self::ValidationFailed,
    ];

    /// Returns the snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StageFailed => "stage_failed",
            Self::TimeoutExceeded => "timeout_exceeded",
            Self::ExternalDependencyUnavailable => "external_dependency_unavailable",
            Self::CircuitBreakerOpen => "circuit_breaker_open",
            Self::ResourceExhausted => "resource_exhausted",
            Self::ValidationFailed => "validation_failed",
        }
    }

    /// Classifies a permanent stage failure. Returns `None` for successes and
    /// transient failures.
    #[must_use]
    pub fn for_stage_result(result: &StageResult) -> Option<Self> {
        match result.failure? {
            FailureKind::Transient => None,
            FailureKind::CircuitOpened | FailureKind::CircuitBlocked => Some(Self::CircuitBreakerOpen),
            FailureKind::Exhausted if result.timed_out => Some(Self::TimeoutExceeded),
            FailureKind::Exhausted => Some(Self::StageFailed),
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issue raised against the recovery engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// The issue category.
    pub issue_type: IssueType,
    /// Caller-supplied details (stage, error text, attempts, ...).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// When the issue was registered.
    pub registered_at: DateTime<Utc>,
    /// When the issue was resolved, if it has been.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Issue {
    /// Creates an active issue.
    #[must_use]
    pub fn new(issue_type: IssueType, metadata: HashMap<String, serde_json::Value>) -> Self {
        Self {
            issue_type,
            metadata,
            registered_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Returns true once the issue has been resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Returns a metadata value as a string, if present.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_issue_type_display_matches_serde() {
        for issue_type in IssueType::ALL {
            let json = serde_json::to_string(&issue_type).unwrap();
            assert_eq!(json, format!("\"{issue_type}\""));
        }
        assert_eq!(IssueType::CircuitBreakerOpen.to_string(), "circuit_breaker_open");
    }

    #[test]
    fn test_issue_type_deserialize() {
        let parsed: IssueType = serde_json::from_str("\"resource_exhausted\"").unwrap();
        assert_eq!(parsed, IssueType::ResourceExhausted);
    }

    #[test]
    fn test_classify_stage_results() {
        let now = Utc::now();
        let ok = StageResult::succeeded("a", now, Duration::ZERO, 1, serde_json::Value::Null);
        assert_eq!(IssueType::for_stage_result(&ok), None);

        let exhausted = StageResult::failed("a", now, Duration::ZERO, 4, FailureKind::Exhausted, "e");
        assert_eq!(IssueType::for_stage_result(&exhausted), Some(IssueType::StageFailed));

        let slow = exhausted.clone().with_timed_out(true);
        assert_eq!(IssueType::for_stage_result(&slow), Some(IssueType::TimeoutExceeded));

        let opened = StageResult::failed("a", now, Duration::ZERO, 2, FailureKind::CircuitOpened, "e");
        assert_eq!(IssueType::for_stage_result(&opened), Some(IssueType::CircuitBreakerOpen));

        let blocked = StageResult::failed("a", now, Duration::ZERO, 0, FailureKind::CircuitBlocked, "e");
        assert_eq!(IssueType::for_stage_result(&blocked), Some(IssueType::CircuitBreakerOpen));
    }

    #[test]
    fn test_issue_metadata() {
        let mut metadata = HashMap::new();
        metadata.insert("stage".to_string(), serde_json::json!("deploy"));
        let issue = Issue::new(IssueType::StageFailed, metadata);

        assert!(!issue.is_resolved());
        assert_eq!(issue.metadata_str("stage"), Some("deploy"));
        assert_eq!(issue.metadata_str("missing"), None);
    }
}
