//! recur - a minimal, embeddable recurring-task runner.
//!
//! Register callbacks with an optional interval; the runner invokes each
//! one whose due time has arrived, in insertion order, and never invokes
//! a task again while its previous asynchronous result is unsettled.

pub mod core;
pub mod events;
pub mod runner;
pub mod testing;

mod queue;

pub use self::core::clock::{Clock, MonotonicClock};
pub use self::core::task::{
    task_fn, AddOptions, TaskContext, TaskError, TaskFn, TaskFuture, TaskInfo, TaskOutcome,
};
pub use self::core::types::TaskId;
pub use self::events::{Event, EventBus, EventHandler};
pub use self::runner::{
    Disposer, OnInit, RunnerConfig, RunnerState, TaskRunner, DEFAULT_TICK_PERIOD,
};
