//! Workflow execution audit records.

use super::IssueType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Immutable record of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Unique execution id.
    pub id: Uuid,
    /// Name of the workflow that ran.
    pub workflow: String,
    /// Issue type the workflow is bound to.
    pub issue_type: IssueType,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub ended_at: DateTime<Utc>,
    /// Names of the actions attempted, in order. Includes the failing action.
    pub actions_taken: Vec<String>,
    /// Whether every action succeeded.
    pub success: bool,
    /// Actions whose rollback handler ran, in rollback order.
    #[serde(default)]
    pub rolled_back: Vec<String>,
    /// Actions whose rollback handler failed.
    #[serde(default)]
    pub rollback_failures: Vec<String>,
    /// Error text of the failing action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Free-form details, including the triggering issue's metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl WorkflowExecution {
    /// Elapsed wall time of the run.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }

    /// Returns true if at least one rollback handler failed.
    #[must_use]
    pub fn has_rollback_failures(&self) -> bool {
        !self.rollback_failures.is_empty()
    }
}

/// Mutable state of a workflow run, frozen into a [`WorkflowExecution`] at the end.
#[derive(Debug)]
pub(crate) struct ExecutionDraft {
    id: Uuid,
    workflow: String,
    issue_type: IssueType,
    started_at: DateTime<Utc>,
    pub(crate) actions_taken: Vec<String>,
    pub(crate) rolled_back: Vec<String>,
    pub(crate) rollback_failures: Vec<String>,
    pub(crate) error: Option<String>,
    pub(crate) metadata: HashMap<String, serde_json::Value>,
}

impl ExecutionDraft {
    pub(crate) fn start(workflow: &str, issue_type: IssueType) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow: workflow.to_string(),
            issue_type,
            started_at: Utc::now(),
            actions_taken: Vec::new(),
            rolled_back: Vec::new(),
            rollback_failures: Vec::new(),
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn finish(self) -> WorkflowExecution {
        WorkflowExecution {
            id: self.id,
            workflow: self.workflow,
            issue_type: self.issue_type,
            started_at: self.started_at,
            ended_at: Utc::now(),
            actions_taken: self.actions_taken,
            success: self.error.is_none(),
            rolled_back: self.rolled_back,
            rollback_failures: self.rollback_failures,
            error: self.error,
            metadata: self.metadata,
        }
    }
}
