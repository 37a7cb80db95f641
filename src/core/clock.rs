//! Monotonic clock abstraction.
//!
//! The runner never reads wall-clock time directly. All due-time checks go
//! through the [`Clock`] trait, which supplies a non-decreasing millisecond
//! timestamp from an arbitrary epoch. The default [`MonotonicClock`] is
//! backed by `tokio::time::Instant`, so it follows tokio's paused test
//! clock and timing tests stay deterministic.

use std::sync::Arc;
use tokio::time::Instant;

/// Source of monotonic "now" in milliseconds.
///
/// Implementations must be non-decreasing. The epoch is arbitrary; only
/// differences between readings are meaningful.
pub trait Clock: Send + Sync {
    /// Current monotonic time in milliseconds since this clock's epoch.
    fn now_ms(&self) -> u64;
}

/// Default clock: milliseconds elapsed since the clock was created.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Create a clock whose epoch is the moment of construction.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}
