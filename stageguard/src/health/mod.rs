//! Per-stage health tracking and circuit breaking.
//!
//! [`StageHealthRegistry`] is the only owner of [`StageHealth`] records; stage
//! logic never touches them directly.

mod record;
mod registry;

pub use record::{HealthReport, StageHealth};
pub use registry::StageHealthRegistry;
