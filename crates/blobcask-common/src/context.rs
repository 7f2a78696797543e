//! Operation context with cancellation
//!
//! Every public blob operation accepts a [`Context`]. Cancelling it
//! aborts in-flight streams at the next chunk boundary and makes the
//! operation return [`Error::Cancelled`].

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation token shared between an operation and its caller.
///
/// Clones observe the same cancellation state.
#[derive(Clone, Debug, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// Create a new, uncancelled context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the operation using this context
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Fail with [`Error::Cancelled`] if cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
