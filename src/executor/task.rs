//! Futures driven on the dispatch thread.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Wake, Waker};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::single_threaded::{ExecutorHandle, Shared};
use super::work_item::WorkItem;

/// Unique identifier for a spawned task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
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

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Handle to a spawned future's output.
pub struct TaskHandle<T> {
    id: TaskId,
    output: Arc<Mutex<Option<T>>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(id: TaskId, output: Arc<Mutex<Option<T>>>) -> Self {
        Self { id, output }
    }

    /// Returns the task's id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns true once the future has completed and its output was not taken.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.output.lock().is_some()
    }

    /// Takes the output, leaving `None` behind.
    #[must_use]
    pub fn take(&self) -> Option<T> {
        self.output.lock().take()
    }

    /// Returns a copy of the output without taking it.
    #[must_use]
    pub fn try_get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.output.lock().clone()
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            output: Arc::clone(&self.output),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("is_complete", &self.is_complete())
            .finish_non_exhaustive()
    }
}

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A spawned future plus the bookkeeping needed to requeue it when woken.
pub(crate) struct Task {
    id: TaskId,
    /// `None` once the future has completed.
    future: Mutex<Option<BoxFuture>>,
    /// Set while a poll for this task sits in the queue.
    scheduled: AtomicBool,
    executor: Weak<Shared>,
}

impl Task {
    pub(crate) fn new<F, T>(future: F, output: Arc<Mutex<Option<T>>>, executor: &ExecutorHandle) -> Arc<Self>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let wrapped = async move {
            let value = future.await;
            *output.lock() = Some(value);
        };
        Arc::new(Self {
            id: TaskId::next(),
            future: Mutex::new(Some(Box::pin(wrapped))),
            scheduled: AtomicBool::new(true),
            executor: executor.downgrade(),
        })
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    /// Wraps one poll of this task as a work item.
    pub(crate) fn work_item(self: &Arc<Self>) -> WorkItem {
        WorkItem::new(|task: Arc<Task>| task.poll(), Arc::clone(self))
    }

    fn poll(self: &Arc<Self>) {
        // Cleared first so a wake during the poll queues another one.
        self.scheduled.store(false, Ordering::Release);

        let mut slot = self.future.lock();
        let Some(future) = slot.as_mut() else {
            return;
        };
        let waker = Waker::from(Arc::clone(self));
        let mut cx = Context::from_waker(&waker);
        if future.as_mut().poll(&mut cx).is_ready() {
            *slot = None;
            trace!(task = %self.id, "task completed");
        }
    }

    fn reschedule(self: &Arc<Self>) {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(shared) = self.executor.upgrade() else {
            trace!(task = %self.id, "wake-up after the executor was dropped");
            return;
        };
        if let Err(reason) = shared.try_enqueue(self.work_item()) {
            debug!(task = %self.id, %reason, "wake-up dropped");
        }
    }
}

impl Wake for Task {
    fn wake(self: Arc<Self>) {
        self.reschedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.reschedule();
    }
}
