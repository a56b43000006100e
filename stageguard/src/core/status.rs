//! Circuit state and failure kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of a stage's circuit breaker.
///
/// There is deliberately no half-open state: once the open window expires
/// the gate closes and the next attempt's outcome decides what happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls are allowed through.
    #[default]
    Closed,
    /// Calls are rejected until the open window expires or a success is recorded.
    Open,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Why a stage execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A single attempt failed and retries remain.
    Transient,
    /// Every allowed attempt failed.
    Exhausted,
    /// The circuit opened while retrying.
    CircuitOpened,
    /// The circuit was already open; nothing was attempted.
    CircuitBlocked,
}

impl FailureKind {
    /// Returns true if the failure is final and may be routed to recovery.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::Transient)
    }

    /// Returns true if the failure involved the circuit breaker.
    #[must_use]
    pub fn is_circuit(&self) -> bool {
        matches!(self, Self::CircuitOpened | Self::CircuitBlocked)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::CircuitOpened => write!(f, "circuit_opened"),
            Self::CircuitBlocked => write!(f, "circuit_blocked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::Open.to_string(), "open");
        assert_eq!(CircuitState::default(), CircuitState::Closed);
    }

    #[test]
    fn test_failure_kind_permanence() {
        assert!(!FailureKind::Transient.is_permanent());
        assert!(FailureKind::Exhausted.is_permanent());
        assert!(FailureKind::CircuitOpened.is_permanent());
        assert!(FailureKind::CircuitBlocked.is_permanent());
        assert!(FailureKind::CircuitBlocked.is_circuit());
        assert!(!FailureKind::Exhausted.is_circuit());
    }

    #[test]
    fn test_failure_kind_serialize() {
        let json = serde_json::to_string(&FailureKind::CircuitOpened).unwrap();
        assert_eq!(json, r#""circuit_opened""#);
    }
}
