//! Pipeline run report.

use crate::core::StageResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Halt reason recorded when the run's cancellation token fired.
pub const HALT_CANCELLED: &str = "cancelled";

/// Outcome of one pipeline execution.
///
/// `results` holds an entry for every stage that ran, including the
/// successful members of a failing level. Stages in levels after a failure
/// are absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Run id of the pipeline context.
    pub run_id: Uuid,
    /// Pipeline name, if the context carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_name: Option<String>,
    /// Per-stage results.
    pub results: HashMap<String, StageResult>,
    /// The scheduled levels.
    pub levels: Vec<Vec<String>>,
    /// Levels whose stages all returned, including a failing level.
    pub levels_completed: usize,
    /// Index of the level after which scheduling stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted_at_level: Option<usize>,
    /// Why scheduling stopped early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
    /// Wall time of the run, in milliseconds.
    pub duration_ms: f64,
}

impl PipelineRun {
    pub(crate) fn new(run_id: Uuid, pipeline_name: Option<String>, levels: Vec<Vec<String>>) -> Self {
        Self {
            run_id,
            pipeline_name,
            results: HashMap::new(),
            levels,
            levels_completed: 0,
            halted_at_level: None,
            halt_reason: None,
            duration_ms: 0.0,
        }
    }

    pub(crate) fn halt(&mut self, level: usize, reason: impl Into<String>) {
        self.halted_at_level = Some(level);
        self.halt_reason = Some(reason.into());
    }

    /// Returns true if every level ran and every stage succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.halted_at_level.is_none()
            && self.levels_completed == self.levels.len()
            && self.results.values().all(StageResult::is_success)
    }

    /// Returns true if the run stopped because it was cancelled.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.halt_reason.as_deref() == Some(HALT_CANCELLED)
    }

    /// Returns the result of one stage.
    #[must_use]
    pub fn result(&self, stage: &str) -> Option<&StageResult> {
        self.results.get(stage)
    }

    /// Names of failed stages, sorted.
    #[must_use]
    pub fn failed_stages(&self) -> Vec<String> {
        self.stages_where(StageResult::is_failure)
    }

    /// Names of succeeded stages, sorted.
    #[must_use]
    pub fn succeeded_stages(&self) -> Vec<String> {
        self.stages_where(StageResult::is_success)
    }

    /// Names of scheduled stages that never ran, sorted.
    #[must_use]
    pub fn skipped_stages(&self) -> Vec<String> {
        let mut skipped: Vec<String> = self
            .levels
            .iter()
            .flatten()
            .filter(|name| !self.results.contains_key(*name))
            .cloned()
            .collect();
        skipped.sort();
        skipped
    }

    fn stages_where(&self, predicate: impl Fn(&StageResult) -> bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .results
            .values()
            .filter(|&r| predicate(r))
            .map(|r| r.stage.clone())
            .collect();
        names.sort();
        names
    }
}
