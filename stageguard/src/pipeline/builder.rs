//! Fluent construction of a validated stage set.

use super::{DependencyGraphScheduler, RecoveryStrategy, StageSpec};
use crate::errors::{PipelineError, UnknownDependencyError};
use crate::stages::Stage;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for stage sets accepted by
/// [`ConcurrentLevelExecutor`](super::ConcurrentLevelExecutor).
///
/// Stages are checked as they are added: names must be unique and every
/// dependency must already be declared. [`build`](Self::build) runs the
/// scheduler's full structural validation.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    name: Option<String>,
    stages: Vec<StageSpec>,
    names: HashSet<String>,
}

impl PipelineBuilder {
    /// Creates an empty, unnamed builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty builder for a named pipeline.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Adds a stage depending on `dependencies`.
    ///
    /// # Errors
    ///
    /// Returns an error for a duplicate name, a self-dependency or a
    /// dependency that has not been added yet.
    pub fn stage(
        self,
        name: impl Into<String>,
        runner: Arc<dyn Stage>,
        dependencies: &[&str],
    ) -> Result<Self, PipelineError> {
        let spec = StageSpec::new(name, runner).with_dependencies(dependencies.iter().copied());
        self.stage_spec(spec)
    }

    /// Adds a stage with its own recovery strategy.
    ///
    /// # Errors
    ///
    /// Same as [`stage`](Self::stage), plus an invalid strategy.
    pub fn stage_with_strategy(
        self,
        name: impl Into<String>,
        runner: Arc<dyn Stage>,
        dependencies: &[&str],
        strategy: RecoveryStrategy,
    ) -> Result<Self, PipelineError> {
        let spec = StageSpec::new(name, runner)
            .with_dependencies(dependencies.iter().copied())
            .with_strategy(strategy);
        self.stage_spec(spec)
    }

    /// Adds a prepared stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage itself is invalid, its name is taken, or one of
    /// its dependencies has not been added yet.
    pub fn stage_spec(mut self, spec: StageSpec) -> Result<Self, PipelineError> {
        spec.validate()?;

        if self.names.contains(spec.name()) {
            return Err(PipelineError::DuplicateStage(spec.name().to_string()));
        }

        let mut deps: Vec<&String> = spec.dependencies().iter().collect();
        deps.sort();
        if let Some(missing) = deps.into_iter().find(|dep| !self.names.contains(*dep)) {
            return Err(UnknownDependencyError::new(spec.name(), missing.as_str()).into());
        }

        self.names.insert(spec.name().to_string());
        self.stages.push(spec);
        Ok(self)
    }

    /// Returns the pipeline name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if a stage with this name has been added.
    #[must_use]
    pub fn has_stage(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Finishes the stage set, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the set is empty or fails structural validation.
    pub fn build(self) -> Result<Vec<StageSpec>, PipelineError> {
        DependencyGraphScheduler::new().validate(&self.stages)?;
        Ok(self.stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::NoOpStage;

    fn noop(name: &str) -> Arc<dyn Stage> {
        Arc::new(NoOpStage::new(name))
    }

    #[test]
    fn test_builds_in_insertion_order() {
        let stages = PipelineBuilder::named("etl")
            .stage("extract", noop("extract"), &[])
            .and_then(|b| b.stage("transform", noop("transform"), &["extract"]))
            .and_then(|b| b.stage("load", noop("load"), &["transform"]))
            .and_then(PipelineBuilder::build)
            .unwrap();

        let names: Vec<&str> = stages.iter().map(StageSpec::name).collect();
        assert_eq!(names, vec!["extract", "transform", "load"]);
        assert!(stages[1].dependencies().contains("extract"));
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let err = PipelineBuilder::new()
            .stage("a", noop("a"), &[])
            .and_then(|b| b.stage("a", noop("a"), &[]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateStage(name) if name == "a"));
    }

    #[test]
    fn test_unknown_dependency_rejected_eagerly() {
        let err = PipelineBuilder::new()
            .stage("a", noop("a"), &["missing"])
            .unwrap_err();
        let PipelineError::UnknownDependency(inner) = err else {
            panic!("expected unknown dependency");
        };
        assert_eq!(inner.stage, "a");
        assert_eq!(inner.dependency, "missing");
    }

    #[test]
    fn test_self_dependency_rejected() {
        let err = PipelineBuilder::new()
            .stage("loop", noop("loop"), &["loop"])
            .unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_empty_build_rejected() {
        let err = PipelineBuilder::named("empty").build().unwrap_err();
        assert_eq!(err.error_info().map(|i| i.code.as_str()), Some("GRAPH-EMPTY"));
    }

    #[test]
    fn test_invalid_strategy_rejected() {
        let err = PipelineBuilder::new()
            .stage_with_strategy("a", noop("a"), &[], RecoveryStrategy::new().with_retry_delay(0.0))
            .unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_strategy_kept_on_spec() {
        let builder = PipelineBuilder::new()
            .stage_with_strategy("a", noop("a"), &[], RecoveryStrategy::new().with_max_retries(0))
            .unwrap();
        assert!(builder.has_stage("a"));
        assert_eq!(builder.stage_count(), 1);
        assert!(builder.name().is_none());

        let stages = builder.build().unwrap();
        assert_eq!(stages[0].strategy.as_ref().map(|s| s.max_retries), Some(0));
    }
}
