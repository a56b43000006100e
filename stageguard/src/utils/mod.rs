//! Utility functions for timestamp handling.

pub mod timestamps;

pub use timestamps::{duration_from_secs, iso_timestamp, Timestamp};
