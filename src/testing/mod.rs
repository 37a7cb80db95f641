//! Testing utilities for users of the runner.
//!
//! This module provides helpers for testing scheduled callbacks:
//!
//! - [`ManualClock`]: a [`Clock`] advanced by hand
//! - [`CountingTask`]: counts its invocations
//! - [`FailingTask`]: fails N times then succeeds
//! - [`PendingTask`]: returns a pending result that settles after a delay
//! - [`context`]: builds a [`TaskContext`] for invoking callbacks directly

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::core::clock::Clock;
use crate::core::task::{task_fn, TaskContext, TaskError, TaskFn, TaskInfo, TaskOutcome};
use crate::core::types::TaskId;

/// A clock advanced explicitly by the test.
///
/// # Example
///
/// ```
/// use recur::testing::ManualClock;
/// use recur::Clock;
///
/// let clock = ManualClock::new();
/// assert_eq!(clock.now_ms(), 0);
/// clock.advance(250);
/// assert_eq!(clock.now_ms(), 250);
/// ```
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Create a clock at time zero.
    pub fn new() -> Self {
        Self {
            now_ms: AtomicU64::new(0),
        }
    }

    /// Advance the clock by `delta_ms` milliseconds.
    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// A task callback that counts its invocations.
pub struct CountingTask {
    count: Arc<AtomicU32>,
    callback: Arc<dyn TaskFn>,
}

impl CountingTask {
    pub fn new() -> Self {
        let count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&count);
        let callback = task_fn(move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(TaskOutcome::Done)
        });
        Self { count, callback }
    }

    /// The shareable callback. Clones of this `Arc` are the same callback
    /// for registration-identity purposes.
    pub fn callback(&self) -> Arc<dyn TaskFn> {
        Arc::clone(&self.callback)
    }

    /// Number of invocations so far.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for CountingTask {
    fn default() -> Self {
        Self::new()
    }
}

/// A task callback that fails a configurable number of times before
/// succeeding. Useful for exercising failure isolation and error events.
pub struct FailingTask {
    calls: Arc<AtomicU32>,
    callback: Arc<dyn TaskFn>,
}

impl FailingTask {
    /// Create a callback that fails `fail_count` times then succeeds.
    pub fn new(fail_count: u32) -> Self {
        Self::with_error(fail_count, "intentional test failure")
    }

    /// Create a failing callback with a custom error message.
    pub fn with_error(fail_count: u32, message: impl Into<String>) -> Self {
        let calls = Arc::new(AtomicU32::new(0));
        let message = message.into();
        let counter = Arc::clone(&calls);
        let callback = task_fn(move |_ctx| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < fail_count {
                Err(TaskError::failed(message.clone()))
            } else {
                Ok(TaskOutcome::Done)
            }
        });
        Self { calls, callback }
    }

    pub fn callback(&self) -> Arc<dyn TaskFn> {
        Arc::clone(&self.callback)
    }

    /// Number of times the callback has been invoked.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// A task callback whose invocations return a pending result that settles
/// after a fixed delay. Tracks invocations and settlements separately so
/// tests can assert that invocations never overlap.
pub struct PendingTask {
    invoked: Arc<AtomicU32>,
    settled: Arc<AtomicU32>,
    callback: Arc<dyn TaskFn>,
}

impl PendingTask {
    /// Create a callback whose results settle successfully.
    pub fn new(settle_after: Duration) -> Self {
        Self::build(settle_after, false)
    }

    /// Create a callback whose results settle with a failure.
    pub fn rejecting(settle_after: Duration) -> Self {
        Self::build(settle_after, true)
    }

    fn build(settle_after: Duration, reject: bool) -> Self {
        let invoked = Arc::new(AtomicU32::new(0));
        let settled = Arc::new(AtomicU32::new(0));
        let invoked_in = Arc::clone(&invoked);
        let settled_in = Arc::clone(&settled);
        let callback = task_fn(move |_ctx| {
            invoked_in.fetch_add(1, Ordering::SeqCst);
            let settled = Arc::clone(&settled_in);
            Ok(TaskOutcome::pending(async move {
                tokio::time::sleep(settle_after).await;
                settled.fetch_add(1, Ordering::SeqCst);
                if reject {
                    Err(TaskError::failed("intentional async failure"))
                } else {
                    Ok(())
                }
            }))
        });
        Self {
            invoked,
            settled,
            callback,
        }
    }

    pub fn callback(&self) -> Arc<dyn TaskFn> {
        Arc::clone(&self.callback)
    }

    /// Number of invocations started.
    pub fn invoked(&self) -> u32 {
        self.invoked.load(Ordering::SeqCst)
    }

    /// Number of results settled.
    pub fn settled(&self) -> u32 {
        self.settled.load(Ordering::SeqCst)
    }
}

/// Build a context for invoking a callback directly in a unit test.
pub fn context(args: Vec<Value>) -> TaskContext {
    let info = TaskInfo {
        id: TaskId::new(0),
        interval_ms: 0,
        last_run_at: None,
    };
    TaskContext::new(info, Arc::new(args), None)
}

/// Build a context carrying a scope object.
pub fn context_with_scope<T: Send + Sync + 'static>(args: Vec<Value>, scope: T) -> TaskContext {
    let info = TaskInfo {
        id: TaskId::new(0),
        interval_ms: 0,
        last_run_at: None,
    };
    TaskContext::new(info, Arc::new(args), Some(Arc::new(scope)))
}
