//! Recovery workflows and their actions.

use super::IssueType;
use crate::context::ContextBag;
use crate::errors::{ContractErrorInfo, PipelineError, PipelineValidationError};
use crate::pipeline::backoff_delay;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Forward handler of an action. `Ok(false)` and `Err` both mean failure.
pub type ActionHandler =
    Arc<dyn Fn(Arc<ContextBag>) -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync>;

/// Compensating handler of an action.
pub type RollbackHandler =
    Arc<dyn Fn(Arc<ContextBag>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// One step of a recovery workflow.
///
/// A rollback handler must be idempotent and tolerate partially applied
/// forward effects.
#[derive(Clone)]
pub struct WorkflowAction {
    /// Action name, unique within its workflow.
    pub name: String,
    handler: ActionHandler,
    rollback: Option<RollbackHandler>,
    /// Retry the handler when it fails.
    pub retry_on_failure: bool,
    /// Retries after the first attempt when `retry_on_failure` is set.
    pub max_retries: u32,
    /// Delay before the first retry, in seconds.
    pub retry_delay_seconds: f64,
    /// Multiplier applied to the delay for each subsequent retry.
    pub backoff_multiplier: f64,
}

impl WorkflowAction {
    /// Creates an action that runs `handler` once.
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<ContextBag>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(move |ctx| handler(ctx).boxed()),
            rollback: None,
            retry_on_failure: false,
            max_retries: 3,
            retry_delay_seconds: 1.0,
            backoff_multiplier: 2.0,
        }
    }

    /// Attaches a compensating rollback handler.
    #[must_use]
    pub fn with_rollback<F, Fut>(mut self, rollback: F) -> Self
    where
        F: Fn(Arc<ContextBag>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.rollback = Some(Arc::new(move |ctx| rollback(ctx).boxed()));
        self
    }

    /// Enables retries with the given budget.
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.retry_on_failure = true;
        self.max_retries = max_retries;
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn with_retry_delay(mut self, seconds: f64) -> Self {
        self.retry_delay_seconds = seconds;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Returns true if a rollback handler is attached.
    #[must_use]
    pub fn has_rollback(&self) -> bool {
        self.rollback.is_some()
    }

    /// Total attempts the engine makes before giving up on this action.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        if self.retry_on_failure {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    /// Delay before the given zero-based attempt.
    #[must_use]
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        backoff_delay(self.retry_delay_seconds, self.backoff_multiplier, attempt - 1)
    }

    /// Runs the forward handler once, mapping `false`, errors and panics to `Err`.
    pub(crate) async fn invoke(&self, ctx: Arc<ContextBag>) -> Result<(), String> {
        match AssertUnwindSafe((self.handler)(ctx)).catch_unwind().await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err("handler returned false".to_string()),
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(_) => Err("handler panicked".to_string()),
        }
    }

    /// Runs the rollback handler, if any. `None` when no handler is attached.
    pub(crate) async fn invoke_rollback(&self, ctx: Arc<ContextBag>) -> Option<Result<(), String>> {
        let rollback = self.rollback.as_ref()?;
        let outcome = match AssertUnwindSafe(rollback(ctx)).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(_) => Err("rollback handler panicked".to_string()),
        };
        Some(outcome)
    }
}

impl fmt::Debug for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowAction")
            .field("name", &self.name)
            .field("has_rollback", &self.has_rollback())
            .field("retry_on_failure", &self.retry_on_failure)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// An ordered list of actions bound to one issue type.
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Workflow name.
    pub name: String,
    /// The issue type this workflow recovers from.
    pub issue_type: IssueType,
    /// Actions, executed in order.
    pub actions: Vec<WorkflowAction>,
    /// Roll back previously succeeded actions when one fails.
    pub rollback_on_failure: bool,
}

impl Workflow {
    /// Creates an empty workflow with rollback enabled.
    #[must_use]
    pub fn new(name: impl Into<String>, issue_type: IssueType) -> Self {
        Self {
            name: name.into(),
            issue_type,
            actions: Vec::new(),
            rollback_on_failure: true,
        }
    }

    /// Appends an action.
    #[must_use]
    pub fn with_action(mut self, action: WorkflowAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Enables or disables rollback on failure.
    #[must_use]
    pub fn with_rollback_on_failure(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = enabled;
        self
    }

    /// Returns the action names in execution order.
    #[must_use]
    pub fn action_names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name.as_str()).collect()
    }

    /// Validates the workflow shape.
    ///
    /// # Errors
    ///
    /// Fails on a blank name, no actions, duplicate action names, or an
    /// action whose retry parameters are not positive.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |message: String| -> PipelineError {
            PipelineValidationError::new(message.clone())
                .with_error_info(
                    ContractErrorInfo::new("WORKFLOW-INVALID", message)
                        .with_context_entry("issue_type", self.issue_type.to_string()),
                )
                .into()
        };

        if self.name.trim().is_empty() {
            return Err(invalid("Workflow name cannot be empty".to_string()));
        }
        if self.actions.is_empty() {
            return Err(invalid(format!("Workflow '{}' has no actions", self.name)));
        }

        let mut seen = HashSet::new();
        for action in &self.actions {
            if !seen.insert(action.name.as_str()) {
                return Err(invalid(format!(
                    "Workflow '{}' declares action '{}' more than once",
                    self.name, action.name
                )));
            }
            if action.retry_on_failure
                && !(action.retry_delay_seconds > 0.0 && action.backoff_multiplier >= 1.0)
            {
                return Err(invalid(format!(
                    "Action '{}' needs a positive retry delay and a multiplier of at least 1",
                    action.name
                )));
            }
        }
        Ok(())
    }
}
