//! Pipeline scheduling and execution.
//!
//! This module provides:
//! - Recovery strategies and engine configuration
//! - Stage specifications and a validating builder
//! - Dependency leveling of a stage set
//! - Per-stage retries with backoff, timeout observation and circuit checks
//! - Level-by-level concurrent execution with halt-on-failure

mod builder;
mod config;
mod dag;
mod executor;
mod integration_tests;
mod retry;
mod run;
mod spec;
mod strategy;

pub use builder::PipelineBuilder;
pub use config::EngineConfig;
pub use dag::{DependencyGraphScheduler, ExecutionPlan};
pub use executor::ConcurrentLevelExecutor;
pub use retry::RetryCoordinator;
pub use run::{PipelineRun, HALT_CANCELLED};
pub use spec::StageSpec;
pub use strategy::{backoff_delay, RecoveryStrategy};
