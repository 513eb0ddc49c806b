//! The `SingleThreadedExecutor` implementation.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::channel::oneshot;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace, warn};

use super::config::{ExecutorBuilder, ExecutorConfig, DEFAULT_SHUTDOWN_TIMEOUT};
use super::context;
use super::state::{ExecutorState, IdlePolicy};
use super::task::{Task, TaskHandle};
use super::work_item::{WorkId, WorkItem};
use crate::error::{Error, InvalidOperation, Result};
use crate::report::{ErrorSink, ResultRecorder};

/// A work queue drained by exactly one thread.
///
/// Any thread may [`post`] work or request [`shutdown`]; one thread calls
/// [`run`] and executes the queued work in FIFO order until shutdown was
/// requested and the queue drained, or the shutdown deadline passed.
///
/// Dropping the executor disposes it: queued work is discarded, a blocked
/// dispatch loop is woken and fails, and every later operation is refused.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use testkit_dispatch::executor::{IdlePolicy, SingleThreadedExecutor};
///
/// let executor = SingleThreadedExecutor::builder()
///     .shutdown_timeout(Duration::from_secs(1))
///     .idle_policy(IdlePolicy::StopWhenDrained)
///     .build();
///
/// let counter = Arc::new(AtomicUsize::new(0));
/// executor
///     .post(|counter: Arc<AtomicUsize>| { counter.fetch_add(1, Ordering::SeqCst); }, Arc::clone(&counter))
///     .unwrap();
/// executor.shutdown();
///
/// executor.run().unwrap();
/// assert_eq!(counter.load(Ordering::SeqCst), 1);
/// ```
///
/// [`post`]: SingleThreadedExecutor::post
/// [`shutdown`]: SingleThreadedExecutor::shutdown
/// [`run`]: SingleThreadedExecutor::run
pub struct SingleThreadedExecutor {
    handle: ExecutorHandle,
}

/// A cloneable reference to an executor, usable from any thread.
///
/// Handles do not keep the executor alive in the disposal sense: once the
/// owning [`SingleThreadedExecutor`] is dropped every operation on a handle
/// fails with [`InvalidOperation::Disposed`].
#[derive(Clone)]
pub struct ExecutorHandle {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    inner: Mutex<Inner>,
    wake: Condvar,
    config: ExecutorConfig,
    results: ResultRecorder,
    sink: Option<Arc<dyn ErrorSink>>,
}

struct Inner {
    state: ExecutorState,
    queue: VecDeque<WorkItem>,
    shutdown_requested_at: Option<Instant>,
    /// Set while a thread is inside `run`.
    loop_active: bool,
}

impl Inner {
    fn deadline_passed(&self, now: Instant, timeout: Duration) -> bool {
        self.shutdown_requested_at
            .is_some_and(|requested_at| now.saturating_duration_since(requested_at) >= timeout)
    }

    /// Moves to `TimedOut` and hands back the queued work so it can be dropped unlocked.
    fn time_out(&mut self) -> VecDeque<WorkItem> {
        self.state = ExecutorState::TimedOut;
        std::mem::take(&mut self.queue)
    }
}

enum Next {
    Item(WorkItem),
    Drained,
    TimedOut(VecDeque<WorkItem>),
    Disposed,
}

impl Shared {
    /// Records a refused operation with every sink and turns it into an [`Error`].
    pub(crate) fn report(&self, reason: InvalidOperation) -> Error {
        let error = Error::from(reason);
        warn!(executor = %self.config.name, error = %error, "executor operation refused");
        self.record(&error);
        error
    }

    /// Records `error` without logging it; the caller already has.
    fn record(&self, error: &Error) {
        self.results.record_error(error);
        if let Some(sink) = &self.sink {
            sink.record_error(error);
        }
    }

    /// Appends `item` to the queue unless the executor no longer accepts work.
    ///
    /// A post arriving after the deadline moves the executor to `TimedOut`.
    pub(crate) fn try_enqueue(&self, item: WorkItem) -> std::result::Result<WorkId, InvalidOperation> {
        let id = item.id();
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            ExecutorState::Disposed => return Err(InvalidOperation::Disposed),
            ExecutorState::TimedOut => return Err(InvalidOperation::PostAfterTimeout),
            state @ (ExecutorState::Completed | ExecutorState::Faulted) => {
                return Err(InvalidOperation::Finished(state));
            }
            ExecutorState::Idle | ExecutorState::Running | ExecutorState::ShuttingDown => {}
        }

        if inner.deadline_passed(now, self.config.shutdown_timeout) {
            let discarded = inner.time_out();
            self.wake.notify_all();
            drop(inner);
            debug!(
                executor = %self.config.name,
                work = %id,
                discarded = discarded.len(),
                "work posted after the shutdown deadline"
            );
            return Err(InvalidOperation::PostAfterTimeout);
        }

        inner.queue.push_back(item);
        let depth = inner.queue.len();
        drop(inner);
        self.wake.notify_all();
        trace!(executor = %self.config.name, work = %id, depth, "work posted");
        Ok(id)
    }

    fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if inner.shutdown_requested_at.is_some() || inner.state.is_terminal() {
            trace!(executor = %self.config.name, state = %inner.state, "shutdown already requested");
            return;
        }
        inner.shutdown_requested_at = Some(Instant::now());
        inner.state = ExecutorState::ShuttingDown;
        let pending = inner.queue.len();
        drop(inner);
        self.wake.notify_all();
        debug!(
            executor = %self.config.name,
            timeout = ?self.config.shutdown_timeout,
            pending,
            "shutdown requested"
        );
    }

    fn dispose(&self) {
        let mut inner = self.inner.lock();
        if inner.state == ExecutorState::Disposed {
            return;
        }
        inner.state = ExecutorState::Disposed;
        let discarded = std::mem::take(&mut inner.queue);
        let loop_active = inner.loop_active;
        drop(inner);
        self.wake.notify_all();
        if discarded.is_empty() {
            debug!(executor = %self.config.name, "executor disposed");
            return;
        }
        warn!(
            executor = %self.config.name,
            discarded = discarded.len(),
            "executor disposed with work still queued"
        );
        // A running loop reports the disposal itself.
        if !loop_active {
            self.record(&Error::from(InvalidOperation::WorkDiscarded));
        }
    }

    /// Claims the dispatch loop for the calling thread.
    fn begin(self: &Arc<Self>) -> std::result::Result<(), InvalidOperation> {
        let mut inner = self.inner.lock();
        if inner.loop_active {
            return Err(if context::is_current(self) {
                InvalidOperation::ReentrantRun
            } else {
                InvalidOperation::AlreadyRunning
            });
        }
        let state = inner.state;
        match state {
            ExecutorState::Idle => inner.state = ExecutorState::Running,
            // Shutdown may be requested before the loop starts.
            ExecutorState::Running | ExecutorState::ShuttingDown => {}
            ExecutorState::Disposed => return Err(InvalidOperation::Disposed),
            state @ (ExecutorState::TimedOut | ExecutorState::Completed | ExecutorState::Faulted) => {
                return Err(InvalidOperation::Finished(state));
            }
        }
        inner.loop_active = true;
        Ok(())
    }

    /// Blocks until there is work to execute or the loop has to stop.
    ///
    /// Every wake-up re-checks both the queue and the deadline.
    fn next(&self) -> Next {
        let timeout = self.config.shutdown_timeout;
        let mut inner = self.inner.lock();
        loop {
            let state = inner.state;
            match state {
                ExecutorState::Disposed => return Next::Disposed,
                ExecutorState::TimedOut => return Next::TimedOut(std::mem::take(&mut inner.queue)),
                _ => {}
            }

            if inner.deadline_passed(Instant::now(), timeout) {
                if inner.queue.is_empty() {
                    inner.state = ExecutorState::Completed;
                    return Next::Drained;
                }
                return Next::TimedOut(inner.time_out());
            }

            if let Some(item) = inner.queue.pop_front() {
                return Next::Item(item);
            }

            let requested_at = inner.shutdown_requested_at;
            match requested_at {
                None => self.wake.wait(&mut inner),
                Some(_) if self.config.idle_policy == IdlePolicy::StopWhenDrained => {
                    inner.state = ExecutorState::Completed;
                    return Next::Drained;
                }
                Some(requested_at) => match requested_at.checked_add(timeout) {
                    Some(deadline) => {
                        let _ = self.wake.wait_until(&mut inner, deadline);
                    }
                    None => self.wake.wait(&mut inner),
                },
            }
        }
    }
}

/// Releases the dispatch loop on every exit path, including unwinding.
struct RunGuard<'a> {
    shared: &'a Shared,
    _context: context::EnterGuard,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        inner.loop_active = false;
        if matches!(inner.state, ExecutorState::Running | ExecutorState::ShuttingDown) {
            // Only reachable when a work item panicked out of the loop.
            inner.state = ExecutorState::Faulted;
            let discarded = std::mem::take(&mut inner.queue);
            drop(inner);
            error!(
                executor = %self.shared.config.name,
                discarded = discarded.len(),
                "dispatch loop unwound by a panicking work item"
            );
            if !discarded.is_empty() {
                self.shared.record(&Error::from(InvalidOperation::WorkDiscarded));
            }
        }
    }
}

impl ExecutorHandle {
    /// Returns the executor whose dispatch loop is running on this thread.
    ///
    /// Work items use this to post more work or request shutdown without
    /// holding an explicit reference.
    #[must_use]
    pub fn current() -> Option<Self> {
        context::current()
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    /// Returns true if this executor's dispatch loop is running on the calling thread.
    #[must_use]
    pub fn is_current(&self) -> bool {
        context::is_current(&self.shared)
    }

    /// Queues `action` to be called with `state` on the dispatch thread.
    ///
    /// Returns as soon as the item is queued.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidOperation`] once the executor timed out,
    /// finished, or was disposed, or when the shutdown deadline has already
    /// passed. The item is dropped without running.
    pub fn post<S, F>(&self, action: F, state: S) -> Result<WorkId>
    where
        F: FnOnce(S) + Send + 'static,
        S: Send + 'static,
    {
        self.enqueue(WorkItem::new(action, state))
    }

    /// Queues a closure that takes no state.
    ///
    /// # Errors
    ///
    /// Same as [`post`](Self::post).
    pub fn post_fn<F>(&self, action: F) -> Result<WorkId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.post(move |()| action(), ())
    }

    pub(crate) fn enqueue(&self, item: WorkItem) -> Result<WorkId> {
        self.shared
            .try_enqueue(item)
            .map_err(|reason| self.shared.report(reason))
    }

    /// Runs `action` on the dispatch thread and waits for its result.
    ///
    /// Called from the dispatch thread itself, `action` runs inline.
    /// Otherwise the caller blocks until the loop reaches the item, so some
    /// thread must be running the loop.
    ///
    /// # Errors
    ///
    /// Fails like [`post`](Self::post) if the item cannot be queued, and with
    /// [`InvalidOperation::WorkDiscarded`] if it was queued but thrown away by
    /// the timeout, a disposal, or a panicking work item. Whoever discarded
    /// the queue already recorded that, so this error is not recorded again.
    pub fn send<F, R>(&self, action: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return Ok(action());
        }
        let (tx, rx) = oneshot::channel();
        self.post(
            move |tx: oneshot::Sender<R>| {
                let _ = tx.send(action());
            },
            tx,
        )?;
        futures::executor::block_on(rx).map_err(|_| Error::from(InvalidOperation::WorkDiscarded))
    }

    /// Drives `future` on the dispatch thread.
    ///
    /// The future is polled by a work item; whenever it is woken, from any
    /// thread, another poll is queued behind the work already waiting.
    ///
    /// # Errors
    ///
    /// Fails like [`post`](Self::post) if the first poll cannot be queued.
    pub fn spawn<F, T>(&self, future: F) -> Result<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let result_slot = Arc::new(Mutex::new(None));
        let task = Task::new(future, Arc::clone(&result_slot), self);
        let id = task.id();
        self.enqueue(task.work_item())?;
        trace!(executor = %self.shared.config.name, task = %id, "task spawned");
        Ok(TaskHandle::new(id, result_slot))
    }

    /// Runs `future` to completion on the calling thread.
    ///
    /// Shutdown is requested as soon as the future completes; the loop then
    /// finishes according to the executor's [`IdlePolicy`]. Under
    /// [`IdlePolicy::LingerUntilDeadline`], the default, this call returns only
    /// once the whole shutdown timeout has elapsed after the future completed.
    /// Build the executor with [`IdlePolicy::StopWhenDrained`] to return as
    /// soon as the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns the dispatch loop's error, or
    /// [`InvalidOperation::TaskIncomplete`] if the loop completed while the
    /// future was still pending.
    pub fn block_on<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let task = self.spawn(async move {
            let output = future.await;
            if let Some(executor) = ExecutorHandle::current() {
                executor.shutdown();
            }
            output
        })?;
        self.run()?;
        task.take()
            .ok_or_else(|| self.shared.report(InvalidOperation::TaskIncomplete))
    }

    /// Runs the dispatch loop on the calling thread.
    ///
    /// Blocks while the queue is empty and no shutdown was requested. Returns
    /// once shutdown was requested and the loop completed under the
    /// [`IdlePolicy`]. Panics raised by work items propagate out of `run`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidOperation`] when called re-entrantly or
    /// while another thread runs the loop, when the executor already
    /// finished, when the shutdown deadline passes with work outstanding, or
    /// when the executor is disposed while running.
    pub fn run(&self) -> Result<()> {
        self.shared
            .begin()
            .map_err(|reason| self.shared.report(reason))?;

        let config = &self.shared.config;
        let _span = tracing::debug_span!("dispatch", executor = %config.name).entered();
        let _guard = RunGuard {
            shared: &self.shared,
            _context: context::enter(self.clone()),
        };
        debug!("dispatch loop started");

        let mut executed = 0_usize;
        loop {
            match self.shared.next() {
                Next::Item(item) => {
                    trace!(work = %item.id(), "executing work item");
                    item.execute();
                    executed += 1;
                }
                Next::Drained => {
                    debug!(executed, "dispatch loop completed");
                    return Ok(());
                }
                Next::TimedOut(discarded) => {
                    error!(
                        executed,
                        discarded = discarded.len(),
                        timeout = ?config.shutdown_timeout,
                        "shutdown deadline expired with work outstanding"
                    );
                    drop(discarded);
                    let error = Error::from(InvalidOperation::ShutdownTimedOut(
                        config.shutdown_timeout,
                    ));
                    self.shared.record(&error);
                    return Err(error);
                }
                Next::Disposed => {
                    debug!(executed, "dispatch loop stopped by disposal");
                    let error = Error::from(InvalidOperation::Disposed);
                    self.shared.record(&error);
                    return Err(error);
                }
            }
        }
    }

    /// Requests shutdown.
    ///
    /// The first call starts the shutdown deadline and wakes the loop; later
    /// calls change nothing. Queued work, and work posted afterwards, keeps
    /// running until the queue drains or the deadline passes.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ExecutorState {
        self.shared.inner.lock().state
    }

    /// Returns the number of queued work items.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    /// Returns true once shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shared.inner.lock().shutdown_requested_at.is_some()
    }

    /// Returns the shutdown deadline, fixed by the first shutdown request.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.shared
            .inner
            .lock()
            .shutdown_requested_at
            .and_then(|requested_at| requested_at.checked_add(self.shared.config.shutdown_timeout))
    }

    /// Returns the executor's configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.shared.config
    }

    /// Returns the recorder every failure is reported to.
    #[must_use]
    pub fn results(&self) -> &ResultRecorder {
        &self.shared.results
    }
}

impl fmt::Debug for ExecutorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("ExecutorHandle")
            .field("name", &self.shared.config.name)
            .field("state", &inner.state)
            .field("pending", &inner.queue.len())
            .finish()
    }
}

impl SingleThreadedExecutor {
    /// Creates an executor with the given shutdown timeout.
    #[must_use]
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self::builder().shutdown_timeout(shutdown_timeout).build()
    }

    /// Returns a builder for a customised executor.
    #[must_use]
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    pub(crate) fn from_parts(
        config: ExecutorConfig,
        results: ResultRecorder,
        sink: Option<Arc<dyn ErrorSink>>,
    ) -> Self {
        let shared = Shared {
            inner: Mutex::new(Inner {
                state: ExecutorState::Idle,
                queue: VecDeque::new(),
                shutdown_requested_at: None,
                loop_active: false,
            }),
            wake: Condvar::new(),
            config,
            results,
            sink,
        };
        Self {
            handle: ExecutorHandle::from_shared(Arc::new(shared)),
        }
    }

    /// Returns a handle for other threads.
    #[must_use]
    pub fn handle(&self) -> ExecutorHandle {
        self.handle.clone()
    }

    /// See [`ExecutorHandle::post`].
    ///
    /// # Errors
    ///
    /// Same as [`ExecutorHandle::post`].
    pub fn post<S, F>(&self, action: F, state: S) -> Result<WorkId>
    where
        F: FnOnce(S) + Send + 'static,
        S: Send + 'static,
    {
        self.handle.post(action, state)
    }

    /// See [`ExecutorHandle::post_fn`].
    ///
    /// # Errors
    ///
    /// Same as [`ExecutorHandle::post`].
    pub fn post_fn<F>(&self, action: F) -> Result<WorkId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.post_fn(action)
    }

    /// See [`ExecutorHandle::send`].
    ///
    /// # Errors
    ///
    /// Same as [`ExecutorHandle::send`].
    pub fn send<F, R>(&self, action: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.send(action)
    }

    /// See [`ExecutorHandle::spawn`].
    ///
    /// # Errors
    ///
    /// Same as [`ExecutorHandle::post`].
    pub fn spawn<F, T>(&self, future: F) -> Result<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// See [`ExecutorHandle::block_on`].
    ///
    /// # Errors
    ///
    /// Same as [`ExecutorHandle::block_on`].
    pub fn block_on<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.block_on(future)
    }

    /// See [`ExecutorHandle::run`].
    ///
    /// # Errors
    ///
    /// Same as [`ExecutorHandle::run`].
    pub fn run(&self) -> Result<()> {
        self.handle.run()
    }

    /// See [`ExecutorHandle::shutdown`].
    pub fn shutdown(&self) {
        self.handle.shutdown();
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ExecutorState {
        self.handle.state()
    }

    /// Returns the number of queued work items.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.handle.pending_count()
    }

    /// Returns the shutdown deadline, if shutdown was requested.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.handle.deadline()
    }

    /// Returns the executor's configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        self.handle.config()
    }

    /// Returns the recorder every failure is reported to.
    #[must_use]
    pub fn results(&self) -> &ResultRecorder {
        self.handle.results()
    }

    /// Releases the executor now instead of at the end of its scope.
    pub fn dispose(self) {
        drop(self);
    }
}

impl Default for SingleThreadedExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_SHUTDOWN_TIMEOUT)
    }
}

impl Drop for SingleThreadedExecutor {
    fn drop(&mut self) {
        self.handle.shared.dispose();
    }
}

impl fmt::Debug for SingleThreadedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleThreadedExecutor")
            .field("handle", &self.handle)
            .finish()
    }
}
