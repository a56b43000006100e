//! Dependency graph scheduling.
//!
//! Turns a stage collection into ordered levels: level 0 holds every stage
//! without dependencies, level `k` every remaining stage whose dependencies
//! were all placed in levels `0..k`.

use super::StageSpec;
use crate::errors::{
    ContractErrorInfo, CycleDetectedError, PipelineError, PipelineValidationError,
    UnknownDependencyError,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Ordered levels of stage names. Members of a level may run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    levels: Vec<Vec<String>>,
}

impl ExecutionPlan {
    /// Returns the levels in execution order.
    #[must_use]
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    /// Returns the number of levels.
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Returns the number of scheduled stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Returns the index of the level containing `stage`.
    #[must_use]
    pub fn level_of(&self, stage: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.iter().any(|name| name == stage))
    }

    /// Returns true if nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Builds execution plans from stage dependency declarations.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyGraphScheduler;

impl DependencyGraphScheduler {
    /// Creates a new scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validates the stages and partitions them into levels.
    ///
    /// Stage names inside a level are sorted for stable output.
    ///
    /// # Errors
    ///
    /// Fails on an empty stage set, a duplicate name, an invalid stage spec,
    /// an unknown dependency, or a cycle. None of these are retryable.
    pub fn schedule(&self, stages: &[StageSpec]) -> Result<ExecutionPlan, PipelineError> {
        let graph = build_adjacency(stages)?;
        detect_cycles(&graph)?;
        Ok(ExecutionPlan {
            levels: partition_levels(&graph),
        })
    }

    /// Runs the structural checks without building levels.
    ///
    /// # Errors
    ///
    /// As [`schedule`](Self::schedule).
    pub fn validate(&self, stages: &[StageSpec]) -> Result<(), PipelineError> {
        let graph = build_adjacency(stages)?;
        detect_cycles(&graph)?;
        Ok(())
    }
}

/// stage name -> dependency names, ordered for deterministic traversal.
type Adjacency = BTreeMap<String, BTreeSet<String>>;

fn build_adjacency(stages: &[StageSpec]) -> Result<Adjacency, PipelineError> {
    if stages.is_empty() {
        return Err(PipelineValidationError::new("Pipeline has no stages")
            .with_error_info(
                ContractErrorInfo::new("GRAPH-EMPTY", "Cannot schedule an empty stage set")
                    .with_fix_hint("Add at least one stage before executing the pipeline."),
            )
            .into());
    }

    let mut graph = Adjacency::new();
    for spec in stages {
        spec.validate()?;
        let deps = spec.dependencies().iter().cloned().collect();
        if graph.insert(spec.name().to_string(), deps).is_some() {
            return Err(PipelineError::DuplicateStage(spec.name().to_string()));
        }
    }

    for (name, deps) in &graph {
        if let Some(missing) = deps.iter().find(|dep| !graph.contains_key(*dep)) {
            return Err(UnknownDependencyError::new(name.clone(), missing.clone()).into());
        }
    }
    Ok(graph)
}

fn detect_cycles(graph: &Adjacency) -> Result<(), CycleDetectedError> {
    let mut visited = HashSet::new();
    let mut visiting = HashSet::new();
    let mut path = Vec::new();

    for name in graph.keys() {
        if !visited.contains(name.as_str()) {
            if let Some(cycle) = dfs_cycle(graph, name, &mut visited, &mut visiting, &mut path) {
                return Err(CycleDetectedError::new(cycle));
            }
        }
    }
    Ok(())
}

fn dfs_cycle<'a>(
    graph: &'a Adjacency,
    node: &'a str,
    visited: &mut HashSet<&'a str>,
    visiting: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visiting.insert(node);
    path.push(node);

    if let Some(deps) = graph.get(node) {
        for dep in deps {
            let dep = dep.as_str();
            if visiting.contains(dep) {
                let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|s| (*s).to_string()).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
            if !visited.contains(dep) {
                if let Some(cycle) = dfs_cycle(graph, dep, visited, visiting, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    visiting.remove(node);
    visited.insert(node);
    None
}

fn partition_levels(graph: &Adjacency) -> Vec<Vec<String>> {
    let mut placed: HashSet<&str> = HashSet::with_capacity(graph.len());
    let mut levels = Vec::new();

    while placed.len() < graph.len() {
        let level: Vec<String> = graph
            .iter()
            .filter(|(name, _)| !placed.contains(name.as_str()))
            .filter(|(_, deps)| deps.iter().all(|dep| placed.contains(dep.as_str())))
            .map(|(name, _)| name.clone())
            .collect();

        // Unreachable after cycle detection; guards against looping forever.
        if level.is_empty() {
            break;
        }
        for name in &level {
            if let Some((key, _)) = graph.get_key_value(name) {
                placed.insert(key.as_str());
            }
        }
        levels.push(level);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::NoOpStage;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn spec(name: &str, deps: &[&str]) -> StageSpec {
        StageSpec::new(name, Arc::new(NoOpStage::new(name))).with_dependencies(deps.iter().copied())
    }

    fn names(level: &[&str]) -> Vec<String> {
        level.iter().map(|s| (*s).to_string()).collect()
    }

    fn assert_plan_respects_dependencies(stages: &[StageSpec], plan: &ExecutionPlan) {
        assert_eq!(plan.stage_count(), stages.len());
        for spec in stages {
            let level = plan.level_of(spec.name()).unwrap();
            for dep in spec.dependencies() {
                assert!(plan.level_of(dep).unwrap() < level, "{dep} must precede {}", spec.name());
            }
        }
        let mut seen = HashSet::new();
        for name in plan.levels().iter().flatten() {
            assert!(seen.insert(name.clone()), "{name} scheduled twice");
        }
    }

    #[test]
    fn test_diamond_levels() {
        let stages = vec![
            spec("fetch", &[]),
            spec("lint", &["fetch"]),
            spec("build", &["fetch"]),
            spec("package", &["lint", "build"]),
        ];
        let plan = DependencyGraphScheduler::new().schedule(&stages).unwrap();

        assert_eq!(
            plan.levels(),
            &[names(&["fetch"]), names(&["build", "lint"]), names(&["package"])]
        );
        assert_plan_respects_dependencies(&stages, &plan);
    }

    #[test]
    fn test_independent_roots_share_level_zero() {
        let stages = vec![spec("c", &["a", "b"]), spec("b", &[]), spec("a", &[])];
        let plan = DependencyGraphScheduler::new().schedule(&stages).unwrap();

        assert_eq!(plan.level_count(), 2);
        assert_eq!(plan.levels()[0], names(&["a", "b"]));
        assert_eq!(plan.levels()[1], names(&["c"]));
    }

    #[test]
    fn test_long_chain_is_fully_serial() {
        let stages: Vec<StageSpec> = (0..6)
            .map(|i| {
                let name = format!("s{i}");
                if i == 0 {
                    spec(&name, &[])
                } else {
                    spec(&name, &[format!("s{}", i - 1).as_str()])
                }
            })
            .collect();
        let plan = DependencyGraphScheduler::new().schedule(&stages).unwrap();

        assert_eq!(plan.level_count(), 6);
        assert_plan_respects_dependencies(&stages, &plan);
    }

    #[test]
    fn test_wide_layered_graph() {
        let mut stages = Vec::new();
        for layer in 0..4 {
            for i in 0..5 {
                let name = format!("l{layer}-{i}");
                let deps: Vec<String> = if layer == 0 {
                    Vec::new()
                } else {
                    (0..=i).map(|j| format!("l{}-{j}", layer - 1)).collect()
                };
                stages.push(StageSpec::new(&name, Arc::new(NoOpStage::new(&name))).with_dependencies(deps));
            }
        }
        let plan = DependencyGraphScheduler::new().schedule(&stages).unwrap();
        assert_eq!(plan.level_count(), 4);
        assert_plan_respects_dependencies(&stages, &plan);
    }

    #[test]
    fn test_cycle_detected() {
        let stages = vec![
            spec("a", &["c"]),
            spec("b", &["a"]),
            spec("c", &["b"]),
            spec("d", &[]),
        ];
        let err = DependencyGraphScheduler::new().schedule(&stages).unwrap_err();

        let PipelineError::CycleDetected(cycle) = err else {
            panic!("expected cycle error");
        };
        let members: HashSet<String> = cycle.stages().into_iter().collect();
        assert_eq!(members, ["a", "b", "c"].iter().map(|s| (*s).to_string()).collect());
        assert!(!members.contains("d"));
        assert_eq!(cycle.cycle_path.first(), cycle.cycle_path.last());
    }

    #[test]
    fn test_two_node_cycle_names_a_participant() {
        let stages = vec![spec("x", &["y"]), spec("y", &["x"])];
        let err = DependencyGraphScheduler::new().schedule(&stages).unwrap_err();
        assert!(err.is_structural());
        let message = err.to_string();
        assert!(message.contains('x') && message.contains('y'));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let stages = vec![spec("loop", &["loop"])];
        let err = DependencyGraphScheduler::new().schedule(&stages).unwrap_err();
        assert_eq!(err.error_info().map(|i| i.code.as_str()), Some("GRAPH-SELF_DEP"));
    }

    #[test]
    fn test_unknown_dependency() {
        let stages = vec![spec("build", &["fetch"])];
        let err = DependencyGraphScheduler::new().schedule(&stages).unwrap_err();

        match err {
            PipelineError::UnknownDependency(e) => {
                assert_eq!(e.stage, "build");
                assert_eq!(e.dependency, "fetch");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_stage() {
        let stages = vec![spec("a", &[]), spec("a", &[])];
        let err = DependencyGraphScheduler::new().schedule(&stages).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateStage(name) if name == "a"));
    }

    #[test]
    fn test_empty_stage_set() {
        let err = DependencyGraphScheduler::new().schedule(&[]).unwrap_err();
        assert_eq!(err.error_info().map(|i| i.code.as_str()), Some("GRAPH-EMPTY"));
    }

    #[test]
    fn test_validate_only() {
        let scheduler = DependencyGraphScheduler::new();
        assert!(scheduler.validate(&[spec("a", &[])]).is_ok());
        assert!(scheduler.validate(&[spec("a", &["b"]), spec("b", &["a"])]).is_err());
    }
}
