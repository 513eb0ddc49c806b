//! Units of work queued on the executor.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier assigned to every successfully posted work item.
///
/// Ids increase in posting order across all executors in the process, which
/// makes them handy for correlating log lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkId(u64);

impl WorkId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "work#{}", self.0)
    }
}

/// A callable bundled with the state it will be invoked with.
pub(crate) struct WorkItem {
    id: WorkId,
    action: Box<dyn FnOnce() + Send>,
}

impl WorkItem {
    pub(crate) fn new<S, F>(action: F, state: S) -> Self
    where
        F: FnOnce(S) + Send + 'static,
        S: Send + 'static,
    {
        Self {
            id: WorkId::next(),
            action: Box::new(move || action(state)),
        }
    }

    pub(crate) fn id(&self) -> WorkId {
        self.id
    }

    /// Consumes the item, invoking its action on the current thread.
    pub(crate) fn execute(self) {
        (self.action)();
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
