//! Lifecycle states of the executor.

use std::fmt;

/// The lifecycle state of a [`SingleThreadedExecutor`](super::SingleThreadedExecutor).
///
/// ```text
/// Idle ──run──▶ Running ──shutdown──▶ ShuttingDown ──drained──▶ Completed
///   │                                      │
///   └──shutdown──▶ ShuttingDown            └──deadline──▶ TimedOut
/// ```
///
/// Any state can move to `Disposed` when the owning executor is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutorState {
    /// Created, no shutdown requested, no loop has started yet.
    Idle,
    /// The dispatch loop is active and no shutdown has been requested.
    Running,
    /// Shutdown was requested; the deadline is counting down.
    ShuttingDown,
    /// The deadline passed with work outstanding. Terminal.
    TimedOut,
    /// The loop drained the queue and returned normally. Terminal.
    Completed,
    /// The owning executor was released. Terminal.
    Disposed,
    /// A work item panicked and unwound the dispatch loop. Terminal.
    Faulted,
}

impl ExecutorState {
    /// Returns true once no loop can ever run on this executor again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::TimedOut | Self::Completed | Self::Disposed | Self::Faulted
        )
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::ShuttingDown => "ShuttingDown",
            Self::TimedOut => "TimedOut",
            Self::Completed => "Completed",
            Self::Disposed => "Disposed",
            Self::Faulted => "Faulted",
        };
        f.write_str(name)
    }
}

/// What the dispatch loop does when its queue is empty after shutdown was requested.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdlePolicy {
    /// Keep waiting for late work until the shutdown deadline, then complete.
    #[default]
    LingerUntilDeadline,
    /// Complete as soon as the queue is empty.
    StopWhenDrained,
}
