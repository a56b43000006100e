//! Structured recovery from systemic issues.
//!
//! An [`Issue`] is raised when a failure pattern, rather than a single
//! attempt, warrants intervention. Each [`IssueType`] can be bound to one
//! [`Workflow`]: an ordered list of [`WorkflowAction`]s with optional
//! compensating rollbacks. Every run is recorded as a [`WorkflowExecution`].

pub mod builtin;
mod engine;
mod execution;
mod issue;
mod workflow;

pub use engine::RecoveryWorkflowEngine;
pub use execution::WorkflowExecution;
pub use issue::{Issue, IssueType};
pub use workflow::{ActionHandler, RollbackHandler, Workflow, WorkflowAction};
