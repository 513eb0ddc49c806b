//! Error definitions
//!
//! Every failure raised by the executor is an [`Error::InvalidOperation`];
//! the wrapped [`InvalidOperation`] tells which rule the caller broke.

use std::time::Duration;

use thiserror::Error;

use crate::executor::ExecutorState;

/// Main error type for testkit-dispatch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The operation is not valid in the executor's current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(#[from] InvalidOperation),
}

/// Why an executor operation was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidOperation {
    /// `run` was called from a work item executing on the same executor.
    #[error("run may not be re-entered from work executing on the same executor")]
    ReentrantRun,

    /// `run` was called while another thread is inside the dispatch loop.
    #[error("the dispatch loop is already running on another thread")]
    AlreadyRunning,

    /// The executor already reached a terminal state.
    #[error("the executor has already finished ({0})")]
    Finished(ExecutorState),

    /// Work was still outstanding when the shutdown deadline passed.
    #[error(
        "work posted to the executor did not complete within {0:?} of shutdown; \
         consider explicitly waiting for the work to complete"
    )]
    ShutdownTimedOut(Duration),

    /// Work was posted after the shutdown deadline passed.
    #[error("work may not be posted after the shutdown deadline has expired")]
    PostAfterTimeout,

    /// The owning executor was released.
    #[error("the executor has been disposed")]
    Disposed,

    /// Work submitted through `send` was discarded before it ran.
    #[error("the work item was discarded before it could run")]
    WorkDiscarded,

    /// The dispatch loop finished while the future passed to `block_on` was still pending.
    #[error("the dispatch loop finished before the future completed")]
    TaskIncomplete,
}

impl Error {
    /// Returns the reason behind an invalid-operation error.
    #[must_use]
    pub fn invalid_operation(&self) -> &InvalidOperation {
        match self {
            Self::InvalidOperation(reason) => reason,
        }
    }

    /// Returns true if the error comes from the shutdown deadline expiring.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.invalid_operation(),
            InvalidOperation::ShutdownTimedOut(_) | InvalidOperation::PostAfterTimeout
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
