//! The recovery workflow engine.

use super::execution::ExecutionDraft;
use super::{Issue, IssueType, Workflow, WorkflowAction, WorkflowExecution};
use crate::context::ContextBag;
use crate::errors::PipelineError;
use crate::events::{emit_stamped, names, noop_sink, EventSink};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct IssueLedger {
    active: HashMap<IssueType, Issue>,
    resolved: Vec<Issue>,
    history: Vec<WorkflowExecution>,
}

/// Runs rollback-capable recovery workflows for systemic issues.
///
/// Owns the workflow registry, the active issue set, the resolved issue
/// history and the execution history. Locks are never held across an await.
pub struct RecoveryWorkflowEngine {
    workflows: RwLock<HashMap<IssueType, Arc<Workflow>>>,
    ledger: Mutex<IssueLedger>,
    event_sink: Arc<dyn EventSink>,
}

impl RecoveryWorkflowEngine {
    /// Creates an engine with no workflows.
    #[must_use]
    pub fn new() -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
            ledger: Mutex::new(IssueLedger::default()),
            event_sink: noop_sink(),
        }
    }

    /// Sets the sink for issue and workflow events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Binds `workflow` to its issue type, replacing any previous binding.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the workflow is malformed.
    pub fn register_workflow(&self, workflow: Workflow) -> Result<(), PipelineError> {
        workflow.validate()?;
        let issue_type = workflow.issue_type;
        let name = workflow.name.clone();
        let previous = self.workflows.write().insert(issue_type, Arc::new(workflow));

        if let Some(previous) = previous {
            info!(
                issue_type = %issue_type,
                workflow = %name,
                replaced = %previous.name,
                "Recovery workflow replaced"
            );
        } else {
            debug!(issue_type = %issue_type, workflow = %name, "Recovery workflow registered");
        }
        Ok(())
    }

    /// Returns true if a workflow is bound to `issue_type`.
    #[must_use]
    pub fn has_workflow(&self, issue_type: IssueType) -> bool {
        self.workflows.read().contains_key(&issue_type)
    }

    /// Returns the workflow bound to `issue_type`.
    #[must_use]
    pub fn workflow(&self, issue_type: IssueType) -> Option<Arc<Workflow>> {
        self.workflows.read().get(&issue_type).cloned()
    }

    /// Marks an issue active. Re-registering an active issue replaces its metadata.
    pub fn register_issue(
        &self,
        issue_type: IssueType,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Issue {
        let issue = Issue::new(issue_type, metadata);
        let replaced = self
            .ledger
            .lock()
            .active
            .insert(issue_type, issue.clone())
            .is_some();

        warn!(issue_type = %issue_type, replaced, "Issue registered");
        emit_stamped(
            self.event_sink.as_ref(),
            names::ISSUE_REGISTERED,
            serde_json::json!({
                "issue_type": issue_type,
                "metadata": &issue.metadata,
                "replaced": replaced,
            }),
        );
        issue
    }

    /// Moves an active issue to the resolved history.
    ///
    /// Returns false, and changes nothing, if the issue is not active.
    pub fn resolve_issue(&self, issue_type: IssueType) -> bool {
        let resolved = {
            let mut ledger = self.ledger.lock();
            match ledger.active.remove(&issue_type) {
                Some(mut issue) => {
                    issue.resolved_at = Some(Utc::now());
                    ledger.resolved.push(issue.clone());
                    Some(issue)
                }
                None => None,
            }
        };

        let Some(issue) = resolved else {
            debug!(issue_type = %issue_type, "Resolve ignored, issue not active");
            return false;
        };

        info!(issue_type = %issue_type, "Issue resolved");
        emit_stamped(
            self.event_sink.as_ref(),
            names::ISSUE_RESOLVED,
            serde_json::json!({
                "issue_type": issue_type,
                "registered_at": issue.registered_at.to_rfc3339(),
            }),
        );
        true
    }

    /// Returns true if `issue_type` is currently active.
    #[must_use]
    pub fn is_active(&self, issue_type: IssueType) -> bool {
        self.ledger.lock().active.contains_key(&issue_type)
    }

    /// Returns the active issues ordered by type.
    #[must_use]
    pub fn active_issues(&self) -> Vec<Issue> {
        let mut issues: Vec<Issue> = self.ledger.lock().active.values().cloned().collect();
        issues.sort_by_key(|issue| issue.issue_type);
        issues
    }

    /// Returns resolved issues in resolution order.
    #[must_use]
    pub fn resolved_issues(&self) -> Vec<Issue> {
        self.ledger.lock().resolved.clone()
    }

    /// Returns every workflow execution in completion order.
    #[must_use]
    pub fn execution_history(&self) -> Vec<WorkflowExecution> {
        self.ledger.lock().history.clone()
    }

    /// Runs the workflow bound to `issue_type` and reports whether it succeeded.
    ///
    /// An unregistered issue type is logged and reported as `false`.
    pub async fn execute_workflow(&self, issue_type: IssueType, ctx: Arc<ContextBag>) -> bool {
        match self.try_execute_workflow(issue_type, ctx).await {
            Ok(execution) => execution.success,
            Err(err) => {
                warn!(issue_type = %issue_type, error = %err, "Recovery workflow not executed");
                false
            }
        }
    }

    /// Runs the workflow bound to `issue_type` and returns its audit record.
    ///
    /// Actions run in order. The first action that still fails after its own
    /// retries stops the workflow; with `rollback_on_failure` every previously
    /// succeeded action is rolled back in reverse order. Rollback errors are
    /// recorded and logged but never escalated. A successful run resolves
    /// the issue.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::WorkflowNotRegistered`] if no workflow is bound.
    pub async fn try_execute_workflow(
        &self,
        issue_type: IssueType,
        ctx: Arc<ContextBag>,
    ) -> Result<WorkflowExecution, PipelineError> {
        let workflow = self
            .workflow(issue_type)
            .ok_or(PipelineError::WorkflowNotRegistered(issue_type))?;

        let mut draft = ExecutionDraft::start(&workflow.name, issue_type);
        if let Some(issue) = self.ledger.lock().active.get(&issue_type) {
            draft.metadata = issue.metadata.clone();
        }

        info!(
            workflow = %workflow.name,
            issue_type = %issue_type,
            execution_id = %draft.id(),
            actions = workflow.actions.len(),
            "Recovery workflow started"
        );
        emit_stamped(
            self.event_sink.as_ref(),
            names::WORKFLOW_STARTED,
            serde_json::json!({
                "workflow": &workflow.name,
                "issue_type": issue_type,
                "execution_id": draft.id().to_string(),
            }),
        );

        let mut succeeded: Vec<&WorkflowAction> = Vec::new();
        for action in &workflow.actions {
            draft.actions_taken.push(action.name.clone());
            match self.run_action(&workflow, action, &ctx).await {
                Ok(()) => succeeded.push(action),
                Err(message) => {
                    draft.error = Some(format!("Action '{}' failed: {message}", action.name));
                    break;
                }
            }
        }

        if draft.error.is_some() && workflow.rollback_on_failure {
            for action in succeeded.iter().rev() {
                match action.invoke_rollback(Arc::clone(&ctx)).await {
                    None => {}
                    Some(Ok(())) => {
                        debug!(workflow = %workflow.name, action = %action.name, "Action rolled back");
                        draft.rolled_back.push(action.name.clone());
                    }
                    Some(Err(message)) => {
                        error!(
                            workflow = %workflow.name,
                            action = %action.name,
                            error = %message,
                            "Rollback failed"
                        );
                        emit_stamped(
                            self.event_sink.as_ref(),
                            names::WORKFLOW_ROLLBACK_FAILED,
                            serde_json::json!({
                                "workflow": &workflow.name,
                                "action": &action.name,
                                "error": &message,
                            }),
                        );
                        draft.rolled_back.push(action.name.clone());
                        draft.rollback_failures.push(action.name.clone());
                    }
                }
            }
        }

        let execution = draft.finish();
        self.ledger.lock().history.push(execution.clone());

        if execution.success {
            info!(
                workflow = %workflow.name,
                issue_type = %issue_type,
                actions = execution.actions_taken.len(),
                "Recovery workflow completed"
            );
            emit_stamped(
                self.event_sink.as_ref(),
                names::WORKFLOW_COMPLETED,
                serde_json::json!({
                    "workflow": &workflow.name,
                    "issue_type": issue_type,
                    "execution_id": execution.id.to_string(),
                    "actions_taken": &execution.actions_taken,
                }),
            );
            self.resolve_issue(issue_type);
        } else {
            error!(
                workflow = %workflow.name,
                issue_type = %issue_type,
                error = execution.error.as_deref().unwrap_or_default(),
                rolled_back = execution.rolled_back.len(),
                "Recovery workflow failed"
            );
            emit_stamped(
                self.event_sink.as_ref(),
                names::WORKFLOW_FAILED,
                serde_json::json!({
                    "workflow": &workflow.name,
                    "issue_type": issue_type,
                    "execution_id": execution.id.to_string(),
                    "actions_taken": &execution.actions_taken,
                    "rolled_back": &execution.rolled_back,
                    "rollback_failures": &execution.rollback_failures,
                    "error": &execution.error,
                }),
            );
        }
        Ok(execution)
    }

    async fn run_action(
        &self,
        workflow: &Workflow,
        action: &WorkflowAction,
        ctx: &Arc<ContextBag>,
    ) -> Result<(), String> {
        let max_attempts = action.max_attempts();
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            let delay = action.delay_before_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match action.invoke(Arc::clone(ctx)).await {
                Ok(()) => {
                    debug!(workflow = %workflow.name, action = %action.name, attempt, "Action succeeded");
                    return Ok(());
                }
                Err(message) => {
                    warn!(
                        workflow = %workflow.name,
                        action = %action.name,
                        attempt,
                        error = %message,
                        "Action attempt failed"
                    );
                    last_error = message;
                }
            }
        }

        emit_stamped(
            self.event_sink.as_ref(),
            names::WORKFLOW_ACTION_FAILED,
            serde_json::json!({
                "workflow": &workflow.name,
                "action": &action.name,
                "attempts": max_attempts,
                "error": &last_error,
            }),
        );
        Err(last_error)
    }
}

impl Default for RecoveryWorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecoveryWorkflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ledger = self.ledger.lock();
        f.debug_struct("RecoveryWorkflowEngine")
            .field("workflows", &self.workflows.read().len())
            .field("active_issues", &ledger.active.len())
            .field("resolved_issues", &ledger.resolved.len())
            .field("executions", &ledger.history.len())
            .finish()
    }
}
