//! Run-level cancellation token.

use crate::utils::Timestamp;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone)]
struct Cancellation {
    reason: String,
    at: Timestamp,
}

/// Records a request to stop scheduling further levels of a run.
///
/// The first request wins; later calls to [`cancel`](Self::cancel) are ignored.
#[derive(Debug, Default)]
pub struct CancellationToken {
    flag: AtomicBool,
    detail: Mutex<Option<Cancellation>>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Returns true if this call cancelled the token.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let mut detail = self.detail.lock();
        if detail.is_some() {
            return false;
        }
        *detail = Some(Cancellation {
            reason: reason.into(),
            at: Utc::now(),
        });
        self.flag.store(true, Ordering::Release);
        true
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Returns the reason given by the winning request.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.detail.lock().as_ref().map(|c| c.reason.clone())
    }

    /// Returns when the token was cancelled.
    #[must_use]
    pub fn cancelled_at(&self) -> Option<Timestamp> {
        self.detail.lock().as_ref().map(|c| c.at)
    }
}
