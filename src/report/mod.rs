//! Failure reporting.
//!
//! The executor reports each of its own failures to an [`ErrorSink`] in
//! addition to returning it. This lets a thread that is not running the
//! dispatch loop find out that something went wrong on it.
//!
//! # Example
//!
//! ```rust
//! use testkit_dispatch::report::{ErrorSink, ResultRecorder, ResultStatus};
//! use testkit_dispatch::error::{Error, InvalidOperation};
//!
//! let recorder = ResultRecorder::new();
//! assert_eq!(recorder.worst_status(), ResultStatus::Success);
//!
//! recorder.record_error(&Error::from(InvalidOperation::PostAfterTimeout));
//! assert_eq!(recorder.worst_status(), ResultStatus::Error);
//! assert_eq!(recorder.messages().len(), 1);
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;

/// Receives executor failures.
pub trait ErrorSink: Send + Sync {
    /// Records one failure event.
    fn record_error(&self, error: &Error);
}

impl<F> ErrorSink for F
where
    F: Fn(&Error) + Send + Sync,
{
    fn record_error(&self, error: &Error) {
        self(error);
    }
}

/// Outcome severity, ordered from best to worst.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResultStatus {
    /// Nothing went wrong.
    #[default]
    Success,
    /// Something suspicious happened but the outcome stands.
    Warning,
    /// An assertion failed.
    Failure,
    /// An unexpected error occurred.
    Error,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "Success",
            Self::Warning => "Warning",
            Self::Failure => "Failure",
            Self::Error => "Error",
        };
        f.write_str(name)
    }
}

/// One recorded entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedResult {
    /// Severity of the entry.
    pub status: ResultStatus,
    /// Human readable description.
    pub message: String,
}

#[derive(Debug, Default)]
struct RecorderState {
    worst: ResultStatus,
    entries: Vec<RecordedResult>,
}

/// Accumulates results and keeps the worst status seen.
///
/// Clones share the same underlying record, so one clone can be handed to the
/// executor while another is inspected by the thread waiting on the outcome.
#[derive(Clone, Debug, Default)]
pub struct ResultRecorder {
    inner: Arc<Mutex<RecorderState>>,
}

impl ResultRecorder {
    /// Creates an empty recorder with status [`ResultStatus::Success`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an entry, raising the worst status if needed.
    pub fn record(&self, status: ResultStatus, message: impl Into<String>) {
        let mut state = self.inner.lock();
        state.worst = state.worst.max(status);
        state.entries.push(RecordedResult {
            status,
            message: message.into(),
        });
    }

    /// Returns the worst status recorded so far.
    #[must_use]
    pub fn worst_status(&self) -> ResultStatus {
        self.inner.lock().worst
    }

    /// Returns every recorded entry, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<RecordedResult> {
        self.inner.lock().entries.clone()
    }

    /// Returns the messages of every recorded entry, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }

    /// Returns the number of entries recorded with [`ResultStatus::Error`].
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|entry| entry.status == ResultStatus::Error)
            .count()
    }

    /// Clears all entries and resets the status to [`ResultStatus::Success`].
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        state.worst = ResultStatus::Success;
        state.entries.clear();
    }
}

impl ErrorSink for ResultRecorder {
    fn record_error(&self, error: &Error) {
        self.record(ResultStatus::Error, error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvalidOperation;

    #[test]
    fn test_new_recorder_is_success() {
        let recorder = ResultRecorder::new();
        assert_eq!(recorder.worst_status(), ResultStatus::Success);
        assert!(recorder.entries().is_empty());
    }

    #[test]
    fn test_worst_status_never_improves() {
        let recorder = ResultRecorder::new();
        recorder.record(ResultStatus::Failure, "assertion");
        recorder.record(ResultStatus::Warning, "slow");

        assert_eq!(recorder.worst_status(), ResultStatus::Failure);
        assert_eq!(recorder.messages(), vec!["assertion", "slow"]);
    }

    #[test]
    fn test_clones_share_entries() {
        let recorder = ResultRecorder::new();
        let observer = recorder.clone();

        recorder.record_error(&Error::from(InvalidOperation::Disposed));

        assert_eq!(observer.worst_status(), ResultStatus::Error);
        assert_eq!(observer.error_count(), 1);
        assert!(observer.messages()[0].contains("disposed"));
    }

    #[test]
    fn test_reset() {
        let recorder = ResultRecorder::new();
        recorder.record(ResultStatus::Error, "boom");
        recorder.reset();

        assert_eq!(recorder.worst_status(), ResultStatus::Success);
        assert_eq!(recorder.error_count(), 0);
    }

    #[test]
    fn test_closure_sink() {
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        let sink = move |_: &Error| *counter.lock() += 1;

        sink.record_error(&Error::from(InvalidOperation::ReentrantRun));
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_status_ordering() {
        assert!(ResultStatus::Success < ResultStatus::Warning);
        assert!(ResultStatus::Warning < ResultStatus::Failure);
        assert!(ResultStatus::Failure < ResultStatus::Error);
        assert_eq!(ResultStatus::Error.to_string(), "Error");
    }
}
