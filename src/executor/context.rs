//! Thread-scoped ambient executor.

use std::cell::RefCell;
use std::sync::Arc;

use super::single_threaded::{ExecutorHandle, Shared};

thread_local! {
    static CURRENT: RefCell<Option<ExecutorHandle>> = const { RefCell::new(None) };
}

/// Restores the previously installed executor when dropped.
pub(crate) struct EnterGuard {
    previous: Option<ExecutorHandle>,
}

/// Installs `handle` as this thread's ambient executor until the guard drops.
pub(crate) fn enter(handle: ExecutorHandle) -> EnterGuard {
    let previous = CURRENT.with(|cell| cell.replace(Some(handle)));
    EnterGuard { previous }
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        // The slot may already be gone during thread teardown.
        let _ = CURRENT.try_with(|cell| {
            cell.replace(previous);
        });
    }
}

pub(crate) fn current() -> Option<ExecutorHandle> {
    CURRENT
        .try_with(|cell| cell.borrow().clone())
        .ok()
        .flatten()
}

/// Returns true if `shared` is the executor running on this thread.
pub(crate) fn is_current(shared: &Arc<Shared>) -> bool {
    CURRENT
        .try_with(|cell| {
            cell.borrow()
                .as_ref()
                .is_some_and(|handle| Arc::ptr_eq(handle.shared(), shared))
        })
        .unwrap_or(false)
}
