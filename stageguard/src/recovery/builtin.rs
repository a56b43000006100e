//! Ready-made recovery workflows.

use super::{IssueType, Workflow, WorkflowAction};
use crate::context::ContextBag;
use crate::health::StageHealthRegistry;
use std::sync::Arc;
use tracing::info;

/// Name of the workflow returned by [`circuit_reset_workflow`].
pub const CIRCUIT_RESET_WORKFLOW: &str = "circuit_reset";

/// Binds [`IssueType::CircuitBreakerOpen`] to resetting the health record of
/// the stage named by the context key `stage`.
///
/// The action fails if the key is missing or the stage has no health record.
#[must_use]
pub fn circuit_reset_workflow(registry: Arc<StageHealthRegistry>) -> Workflow {
    let action = WorkflowAction::new("reset_stage_health", move |ctx: Arc<ContextBag>| {
        let registry = Arc::clone(&registry);
        async move {
            let stage = ctx
                .get_str("stage")
                .ok_or_else(|| anyhow::anyhow!("recovery context has no 'stage' entry"))?;
            let reset = registry.reset(&stage);
            if reset {
                info!(stage = %stage, "Stage health reset by recovery workflow");
            }
            Ok(reset)
        }
    });

    Workflow::new(CIRCUIT_RESET_WORKFLOW, IssueType::CircuitBreakerOpen)
        .with_rollback_on_failure(false)
        .with_action(action)
}
