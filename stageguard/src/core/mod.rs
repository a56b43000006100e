//! Core domain model types for stageguard.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Circuit state and failure kind enums
//! - The per-stage execution result

mod result;
mod status;

pub use result::StageResult;
pub use status::{CircuitState, FailureKind};
