//! Single-threaded work-queue executor
//!
//! This module provides [`SingleThreadedExecutor`], a FIFO work queue that is
//! drained by exactly one thread. Other threads post work through an
//! [`ExecutorHandle`] and request shutdown; the loop keeps draining until the
//! queue is empty or the shutdown deadline passes.
//!
//! # Example
//!
//! ```rust
//! use std::thread;
//! use std::time::Duration;
//! use testkit_dispatch::executor::{ExecutorHandle, IdlePolicy, SingleThreadedExecutor};
//!
//! let executor = SingleThreadedExecutor::builder()
//!     .shutdown_timeout(Duration::from_secs(5))
//!     .idle_policy(IdlePolicy::StopWhenDrained)
//!     .build();
//!
//! // Work can come from any thread...
//! let handle = executor.handle();
//! let producer = thread::spawn(move || {
//!     handle
//!         .post_fn(|| {
//!             // ...and runs on the dispatch thread, where the executor is ambient.
//!             ExecutorHandle::current().unwrap().shutdown();
//!         })
//!         .unwrap();
//! });
//!
//! executor.run().unwrap();
//! producer.join().unwrap();
//! ```

mod config;
mod context;
mod single_threaded;
mod state;
mod task;
mod work_item;

pub use config::{ExecutorBuilder, ExecutorConfig, DEFAULT_SHUTDOWN_TIMEOUT};
pub use single_threaded::{ExecutorHandle, SingleThreadedExecutor};
pub use state::{ExecutorState, IdlePolicy};
pub use task::{TaskHandle, TaskId};
pub use work_item::WorkId;
