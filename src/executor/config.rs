//! Executor configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::single_threaded::SingleThreadedExecutor;
use super::state::IdlePolicy;
use crate::report::{ErrorSink, ResultRecorder};

/// Grace period between the first shutdown request and the timeout.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Plain configuration values of an executor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// How long queued work may keep running after the first shutdown request.
    pub shutdown_timeout: Duration,
    /// Behaviour of the loop when the queue empties after shutdown.
    pub idle_policy: IdlePolicy,
    /// Name attached to the executor's log span.
    pub name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            idle_policy: IdlePolicy::default(),
            name: "single-threaded".to_string(),
        }
    }
}

/// Builds a [`SingleThreadedExecutor`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use testkit_dispatch::executor::{IdlePolicy, SingleThreadedExecutor};
///
/// let executor = SingleThreadedExecutor::builder()
///     .shutdown_timeout(Duration::from_millis(250))
///     .idle_policy(IdlePolicy::StopWhenDrained)
///     .name("fixture")
///     .build();
///
/// assert_eq!(executor.config().shutdown_timeout, Duration::from_millis(250));
/// ```
#[derive(Default)]
pub struct ExecutorBuilder {
    config: ExecutorConfig,
    results: Option<ResultRecorder>,
    sink: Option<Arc<dyn ErrorSink>>,
}

impl ExecutorBuilder {
    /// Starts from [`ExecutorConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    #[must_use]
    pub fn from_config(config: ExecutorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Sets the shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Sets the idle policy.
    #[must_use]
    pub fn idle_policy(mut self, policy: IdlePolicy) -> Self {
        self.config.idle_policy = policy;
        self
    }

    /// Sets the name used in log output.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Shares an existing recorder instead of creating a fresh one.
    #[must_use]
    pub fn result_recorder(mut self, recorder: ResultRecorder) -> Self {
        self.results = Some(recorder);
        self
    }

    /// Forwards every failure to `sink` as well as to the result recorder.
    #[must_use]
    pub fn error_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Creates the executor.
    #[must_use]
    pub fn build(self) -> SingleThreadedExecutor {
        SingleThreadedExecutor::from_parts(self.config, self.results.unwrap_or_default(), self.sink)
    }
}

impl fmt::Debug for ExecutorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorBuilder")
            .field("config", &self.config)
            .field("forwarding", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ResultStatus;

    #[test]
    fn test_default_config() {
        let config = ExecutorConfig::default();
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(config.idle_policy, IdlePolicy::LingerUntilDeadline);
    }

    #[test]
    fn test_builder_sets_values() {
        let executor = ExecutorBuilder::new()
            .shutdown_timeout(Duration::from_millis(5))
            .idle_policy(IdlePolicy::StopWhenDrained)
            .name("unit")
            .build();

        let config = executor.config();
        assert_eq!(config.shutdown_timeout, Duration::from_millis(5));
        assert_eq!(config.idle_policy, IdlePolicy::StopWhenDrained);
        assert_eq!(config.name, "unit");
    }

    #[test]
    fn test_builder_shares_recorder() {
        let recorder = ResultRecorder::new();
        let executor = ExecutorBuilder::new()
            .result_recorder(recorder.clone())
            .build();

        executor.results().record(ResultStatus::Warning, "shared");
        assert_eq!(recorder.worst_status(), ResultStatus::Warning);
    }

    #[test]
    fn test_from_config() {
        let config = ExecutorConfig {
            shutdown_timeout: Duration::from_secs(1),
            ..ExecutorConfig::default()
        };
        let executor = ExecutorBuilder::from_config(config.clone()).build();
        assert_eq!(executor.config(), &config);
    }
}
