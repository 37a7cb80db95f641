//! Runner type definitions.
//!
//! This module contains the lifecycle state enum and the constructor
//! configuration for [`TaskRunner`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::clock::Clock;

use super::engine::TaskRunner;

/// Default period of the driving tick.
///
/// Short enough that interval-based due checks are accurate to a few
/// milliseconds; this is not a real-time guarantee.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(5);

/// Lifecycle state of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Constructed, never started.
    Ready,
    /// The loop is actively ticking.
    Running,
    /// Ticking is suspended because the queue drained naturally.
    Idle,
    /// Explicitly halted; terminal until `destroy`.
    Stopped,
}

/// Hook invoked once with the freshly constructed runner.
pub type OnInit = Box<dyn FnOnce(&TaskRunner) + Send>;

/// Constructor configuration for [`TaskRunner`].
///
/// ```ignore
/// let runner = TaskRunner::with_config(
///     RunnerConfig::new()
///         .start_on_add(true)
///         .tick_period(Duration::from_millis(10)),
/// );
/// ```
#[derive(Default)]
pub struct RunnerConfig {
    pub(crate) on_init: Option<OnInit>,
    pub(crate) start_on_add: bool,
    pub(crate) tick_period: Option<Duration>,
    pub(crate) clock: Option<Arc<dyn Clock>>,
}

impl RunnerConfig {
    /// Create a configuration with defaults: no init hook, explicit
    /// `start()` required, the default tick period, the monotonic clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a hook invoked once with the new runner instance.
    pub fn on_init(mut self, hook: impl FnOnce(&TaskRunner) + Send + 'static) -> Self {
        self.on_init = Some(Box::new(hook));
        self
    }

    /// If set, the first `add()` on a ready runner starts the loop
    /// automatically instead of requiring an explicit `start()`.
    pub fn start_on_add(mut self, start_on_add: bool) -> Self {
        self.start_on_add = start_on_add;
        self
    }

    /// Set the period of the driving tick.
    pub fn tick_period(mut self, period: Duration) -> Self {
        self.tick_period = Some(period);
        self
    }

    /// Replace the monotonic clock, e.g. with a manual clock in tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }
}

impl fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("start_on_add", &self.start_on_add)
            .field("tick_period", &self.tick_period)
            .field("has_on_init", &self.on_init.is_some())
            .field("has_clock", &self.clock.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RunnerConfig::new();
        assert!(!config.start_on_add);
        assert!(config.on_init.is_none());
        assert!(config.tick_period.is_none());
        assert!(config.clock.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = RunnerConfig::new()
            .start_on_add(true)
            .tick_period(Duration::from_millis(10))
            .on_init(|_runner| {});

        assert!(config.start_on_add);
        assert_eq!(config.tick_period, Some(Duration::from_millis(10)));
        assert!(config.on_init.is_some());
    }

    #[test]
    fn test_runner_state_is_comparable() {
        assert_eq!(RunnerState::Ready, RunnerState::Ready);
        assert_ne!(RunnerState::Running, RunnerState::Idle);
    }
}
