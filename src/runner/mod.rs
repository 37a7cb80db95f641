//! The scheduling engine: loop, evaluation cycle, async gate, lifecycle.

mod engine;
mod types;

pub use engine::{Disposer, TaskRunner};
pub use types::{OnInit, RunnerConfig, RunnerState, DEFAULT_TICK_PERIOD};
