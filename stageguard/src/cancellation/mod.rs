//! Cooperative cancellation between pipeline levels.
//!
//! The engine never interrupts a running stage; a cancelled token only stops
//! further levels from being scheduled.

mod token;

pub use token::CancellationToken;
