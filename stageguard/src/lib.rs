//! # Stageguard
//!
//! Resilient execution of multi-stage pipelines.
//!
//! Stageguard runs a set of named stages with declared dependencies and
//! provides:
//!
//! - **Dependency leveling**: stages are grouped into levels; a level only
//!   starts once every earlier level has finished
//! - **Concurrent levels**: independent stages in a level run in parallel on a
//!   bounded worker pool
//! - **Retries with backoff**: failed attempts are retried with exponential
//!   delays, with a per-attempt timeout watchdog
//! - **Circuit breaking**: repeated failures open a per-stage circuit that
//!   rejects executions until its window expires
//! - **Recovery workflows**: permanent failures become issues that can be
//!   handled by ordered actions with compensating rollbacks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stageguard::prelude::*;
//!
//! let stages = PipelineBuilder::named("etl")
//!     .stage("extract", Arc::new(ExtractStage::new()), &[])?
//!     .stage("transform", Arc::new(TransformStage::new()), &["extract"])?
//!     .stage("load", Arc::new(LoadStage::new()), &["transform"])?
//!     .build()?;
//!
//! let registry = Arc::new(StageHealthRegistry::default());
//! let executor = ConcurrentLevelExecutor::new(EngineConfig::default(), registry);
//! let run = executor.execute_pipeline(&stages, Arc::new(PipelineContext::new())).await?;
//! assert!(run.success());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod health;
pub mod observability;
pub mod pipeline;
pub mod recovery;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{ContextBag, PipelineContext, StageContext};
    pub use crate::core::{CircuitState, FailureKind, StageResult};
    pub use crate::errors::{
        ContractErrorInfo, CycleDetectedError, PipelineError, PipelineValidationError,
        UnknownDependencyError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::health::{HealthReport, StageHealth, StageHealthRegistry};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        ConcurrentLevelExecutor, DependencyGraphScheduler, EngineConfig, ExecutionPlan,
        PipelineBuilder, PipelineRun, RecoveryStrategy, RetryCoordinator, StageSpec,
    };
    pub use crate::recovery::{
        Issue, IssueType, RecoveryWorkflowEngine, Workflow, WorkflowAction, WorkflowExecution,
    };
    pub use crate::stages::{FnStage, NoOpStage, Stage};
    pub use crate::utils::{iso_timestamp, Timestamp};
    pub use std::sync::Arc;
}
