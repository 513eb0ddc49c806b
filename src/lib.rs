//! # testkit-dispatch
//!
//! > Run callback-driven and async test code on exactly one thread
//!
//! **testkit-dispatch** provides a single-threaded work-queue executor. Any
//! thread can post work into it; one dedicated thread drains it in FIFO
//! order. Once shutdown is requested the queue gets a bounded grace period to
//! drain, after which outstanding work is discarded and the failure is both
//! returned and recorded.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use testkit_dispatch::prelude::*;
//!
//! let executor = SingleThreadedExecutor::builder()
//!     .shutdown_timeout(Duration::from_secs(1))
//!     .idle_policy(IdlePolicy::StopWhenDrained)
//!     .build();
//!
//! let answer = executor.block_on(async { 6 * 7 }).unwrap();
//! assert_eq!(answer, 42);
//! assert_eq!(executor.results().worst_status(), ResultStatus::Success);
//! ```
//!
//! ## Features
//!
//! - **FIFO dispatch** - work runs one item at a time, in posting order
//! - **Shutdown deadline** - late or stuck work fails the loop instead of hanging
//! - **Ambient executor** - work items reach their executor via [`ExecutorHandle::current`]
//! - **Result recording** - failures land in a [`ResultRecorder`](report::ResultRecorder)
//! - **`#[testkit_dispatch::test]`** - async tests on a single-threaded executor
//!
//! [`ExecutorHandle::current`]: executor::ExecutorHandle::current

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod executor;
pub mod report;

/// Prelude for convenient imports
///
/// ```rust
/// use testkit_dispatch::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, InvalidOperation, Result};
    pub use crate::executor::{
        ExecutorBuilder, ExecutorConfig, ExecutorHandle, ExecutorState, IdlePolicy,
        SingleThreadedExecutor, TaskHandle, TaskId, WorkId,
    };
    pub use crate::report::{ErrorSink, ResultRecorder, ResultStatus};
}

// Re-exports
pub use error::{Error, Result};

#[cfg(feature = "macros")]
pub use testkit_dispatch_macros::test;
