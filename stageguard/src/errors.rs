//! Error types for the stageguard engine.
//!
//! Only structural problems (bad graphs, bad configuration) and programmer
//! errors surface as `Err` values. Stage and workflow failures are encoded in
//! [`StageResult`](crate::core::StageResult) and
//! [`WorkflowExecution`](crate::recovery::WorkflowExecution) instead.

use crate::recovery::IssueType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for stageguard operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A pipeline validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A cycle was detected in the dependency graph.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// A stage depends on a stage that is not part of the run.
    #[error("{0}")]
    UnknownDependency(#[from] UnknownDependencyError),

    /// The same stage name was declared twice.
    #[error("Stage '{0}' is declared more than once")]
    DuplicateStage(String),

    /// A recovery strategy violates its invariants.
    #[error("Invalid recovery strategy: {0}")]
    InvalidStrategy(String),

    /// No workflow is bound to the issue type.
    #[error("No recovery workflow registered for issue type '{0}'")]
    WorkflowNotRegistered(IssueType),

    /// Engine configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Returns true for errors caused by the shape of the stage graph.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::CycleDetected(_)
                | Self::UnknownDependency(_)
                | Self::DuplicateStage(_)
        )
    }

    /// Returns the contract error info, if this error carries one.
    #[must_use]
    pub fn error_info(&self) -> Option<&ContractErrorInfo> {
        match self {
            Self::Validation(e) => e.error_info.as_ref(),
            Self::CycleDetected(e) => Some(&e.error_info),
            Self::UnknownDependency(e) => Some(&e.error_info),
            _ => None,
        }
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }
}

/// Error raised when a cycle is detected in the dependency graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stages forming the cycle; the first stage is repeated at the end.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "GRAPH-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }

    /// Returns the distinct stages participating in the cycle.
    #[must_use]
    pub fn stages(&self) -> Vec<String> {
        let mut stages = self.cycle_path.clone();
        if stages.len() > 1 && stages.first() == stages.last() {
            stages.pop();
        }
        stages
    }
}

/// Error raised when a stage references a dependency outside the run.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' depends on unknown stage '{dependency}'")]
pub struct UnknownDependencyError {
    /// The stage declaring the dependency.
    pub stage: String,
    /// The missing dependency.
    pub dependency: String,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl UnknownDependencyError {
    /// Creates a new unknown dependency error.
    #[must_use]
    pub fn new(stage: impl Into<String>, dependency: impl Into<String>) -> Self {
        let stage = stage.into();
        let dependency = dependency.into();
        let info = ContractErrorInfo::new(
            "GRAPH-UNKNOWN_DEP",
            format!("Dependency '{dependency}' not found"),
        )
        .with_fix_hint("Declare every dependency as a stage in the same run.")
        .with_context_entry("stage", stage.clone());

        Self {
            stage,
            dependency,
            error_info: info,
        }
    }
}
