//! Stage specifications: a runner plus its dependency declaration.

use super::RecoveryStrategy;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::stages::Stage;
use std::collections::HashSet;
use std::sync::Arc;

/// Specification for a single stage in a pipeline run.
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
    /// Names of stages that must succeed before this one starts.
    pub dependencies: HashSet<String>,
    /// Strategy override for this stage.
    pub strategy: Option<RecoveryStrategy>,
}

impl StageSpec {
    /// Creates a new stage specification.
    #[must_use]
    pub fn new(name: impl Into<String>, runner: Arc<dyn Stage>) -> Self {
        Self {
            name: name.into(),
            runner,
            dependencies: HashSet::new(),
            strategy: None,
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.insert(dep.into());
        self
    }

    /// Overrides the recovery strategy for this stage.
    #[must_use]
    pub fn with_strategy(mut self, strategy: RecoveryStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &HashSet<String> {
        &self.dependencies
    }

    /// Validates the stage specification in isolation.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank, the stage depends on itself,
    /// or its strategy override is invalid.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Stage name cannot be empty"));
        }
        if self.dependencies.contains(&self.name) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' cannot depend on itself",
                self.name
            ))
            .with_stages(vec![self.name.clone()])
            .with_error_info(ContractErrorInfo::new(
                "GRAPH-SELF_DEP",
                format!("Stage '{}' lists itself as a dependency", self.name),
            )));
        }
        if let Some(strategy) = &self.strategy {
            strategy.validate().map_err(|e| {
                PipelineValidationError::new(format!("Stage '{}': {e}", self.name))
                    .with_stages(vec![self.name.clone()])
                    .with_error_info(ContractErrorInfo::new("STRATEGY-INVALID", e.to_string()))
            })?;
        }
        Ok(())
    }
}
