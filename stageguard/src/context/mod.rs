//! Context management for pipeline execution.
//!
//! This module provides:
//! - A thread-safe key/value bag shared by every stage in a run
//! - The pipeline-wide execution context
//! - The per-attempt stage context handed to the execution contract

mod bag;
mod execution;

pub use bag::ContextBag;
pub use execution::{PipelineContext, StageContext};
