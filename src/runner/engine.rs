//! Runner engine implementation.
//!
//! The runner is responsible for:
//! - Registering callbacks with an optional interval
//! - Driving the evaluation cycle on a fixed tick
//! - Serializing asynchronous invocations per task (the async gate)
//! - The READY / RUNNING / IDLE / STOPPED lifecycle state machine
//!
//! Scheduling is single-flow cooperative: at most one loop task advances
//! the queue, and an asynchronous callback suspends only its own task's
//! future evaluation, never the loop.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::core::clock::{Clock, MonotonicClock};
use crate::core::task::{AddOptions, TaskContext, TaskFn, TaskFuture, TaskInfo, TaskOutcome};
use crate::core::types::TaskId;
use crate::events::{Event, EventBus};
use crate::queue::TaskQueue;

use super::types::{RunnerConfig, RunnerState, DEFAULT_TICK_PERIOD};

/// State behind the runner's mutex.
///
/// The lock is never held across an `await` and callbacks are always
/// invoked outside it, so re-entrant `add`/`dispose`/`size` calls from
/// inside a callback cannot deadlock.
struct Inner {
    queue: TaskQueue,
    state: RunnerState,
    /// Bumped every time a loop task is spawned; a loop whose epoch no
    /// longer matches has been superseded and exits at its next check.
    loop_epoch: u64,
}

/// Shared core owned by every [`TaskRunner`] clone, loop task, and
/// settlement watcher.
pub(crate) struct RunnerCore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    tick_period: Duration,
    start_on_add: bool,
    /// Wakes a sleeping loop early so `stop()` takes effect before the
    /// next natural tick.
    wake: Notify,
}

/// What the locked portion of an evaluation decided.
enum Decision {
    /// Entry removed, not due, or the runner stopped mid-pass.
    Skip,
    /// Previous invocation still pending; continuation queued.
    Deferred { timestamp_ms: u64 },
    /// Invoke the callback now.
    Invoke {
        callback: Arc<dyn TaskFn>,
        ctx: TaskContext,
        started_at: u64,
        interval_ms: u64,
    },
}

impl RunnerCore {
    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("runner state lock poisoned")
    }

    fn spawn_loop(core: Arc<RunnerCore>, epoch: u64) {
        tokio::spawn(async move {
            RunnerCore::run_loop(core, epoch).await;
        });
    }

    /// Main scheduler loop: one evaluation cycle per tick, then a state
    /// transition. Exits on STOPPED, on a drained queue (IDLE), or when
    /// superseded by a newer loop.
    async fn run_loop(core: Arc<RunnerCore>, epoch: u64) {
        debug!(epoch, "scheduler loop started");
        core.events
            .emit(Event::RunnerStarted {
                timestamp_ms: core.clock.now_ms(),
            })
            .await;

        enum Next {
            Tick,
            Idle,
            Stop,
            Superseded,
        }

        loop {
            RunnerCore::run_cycle(&core, epoch).await;

            let next = {
                let mut inner = core.lock_inner();
                if inner.loop_epoch != epoch {
                    Next::Superseded
                } else {
                    match inner.state {
                        RunnerState::Running if inner.queue.is_empty() => {
                            inner.state = RunnerState::Idle;
                            Next::Idle
                        }
                        RunnerState::Running => Next::Tick,
                        RunnerState::Stopped => Next::Stop,
                        RunnerState::Ready | RunnerState::Idle => Next::Superseded,
                    }
                }
            };

            match next {
                Next::Tick => {}
                Next::Idle => {
                    debug!("queue drained, loop suspended");
                    core.events
                        .emit(Event::RunnerIdle {
                            timestamp_ms: core.clock.now_ms(),
                        })
                        .await;
                    return;
                }
                Next::Stop => {
                    debug!("scheduler loop stopped");
                    core.events
                        .emit(Event::RunnerStopped {
                            timestamp_ms: core.clock.now_ms(),
                        })
                        .await;
                    return;
                }
                Next::Superseded => return,
            }

            tokio::select! {
                _ = tokio::time::sleep(core.tick_period) => {}
                _ = core.wake.notified() => {}
            }
        }
    }

    /// One pass over a snapshot of the queue in insertion order.
    ///
    /// In-pass mutations (removals by invoked callbacks, newly added
    /// tasks) do not affect the set considered by this pass; additions
    /// are picked up on the next tick.
    async fn run_cycle(core: &Arc<RunnerCore>, epoch: u64) {
        let snapshot = {
            let inner = core.lock_inner();
            if inner.loop_epoch != epoch || inner.state != RunnerState::Running {
                return;
            }
            inner.queue.ids()
        };

        for id in snapshot {
            RunnerCore::evaluate(core, id).await;
        }
    }

    /// Evaluate a single entry: due check, async gate, invocation.
    ///
    /// Also re-entered by settlement watchers to honor a queued
    /// continuation.
    async fn evaluate(core: &Arc<RunnerCore>, id: TaskId) {
        let decision = {
            let mut inner = core.lock_inner();
            if inner.state == RunnerState::Stopped {
                return;
            }
            let now = core.clock.now_ms();

            let mut remove_one_shot = false;
            let decision = match inner.queue.get_mut(id) {
                // Removed from the live queue since the snapshot.
                None => Decision::Skip,
                Some(entry) => {
                    let due = match entry.last_run_at {
                        // Never run: due on the first pass.
                        None => true,
                        Some(ts) => now.saturating_sub(ts) >= entry.interval_ms,
                    };
                    if !due {
                        Decision::Skip
                    } else if entry.pending {
                        // Coalesced: at most one continuation per entry.
                        entry.continuation = true;
                        Decision::Deferred { timestamp_ms: now }
                    } else {
                        let info = TaskInfo {
                            id,
                            interval_ms: entry.interval_ms,
                            last_run_at: entry.last_run_at,
                        };
                        let ctx =
                            TaskContext::new(info, Arc::clone(&entry.args), entry.scope.clone());
                        let callback = Arc::clone(&entry.callback);
                        entry.last_run_at = Some(now);
                        if entry.interval_ms == 0 {
                            // One-shot: out of the queue strictly before
                            // invocation, so it cannot be re-entered even
                            // if the callback schedules recursively.
                            remove_one_shot = true;
                        }
                        Decision::Invoke {
                            callback,
                            ctx,
                            started_at: now,
                            interval_ms: info.interval_ms,
                        }
                    }
                }
            };
            if remove_one_shot {
                inner.queue.remove(id);
            }
            decision
        };

        match decision {
            Decision::Skip => {}
            Decision::Deferred { timestamp_ms } => {
                debug!(task_id = %id, "previous invocation still pending, continuation queued");
                core.events
                    .emit(Event::task_deferred(id, timestamp_ms))
                    .await;
            }
            Decision::Invoke {
                callback,
                ctx,
                started_at,
                interval_ms,
            } => {
                core.events.emit(Event::task_invoked(id, started_at)).await;
                match callback.call(ctx) {
                    Ok(TaskOutcome::Done) => {
                        let now = core.clock.now_ms();
                        core.events
                            .emit(Event::task_completed(
                                id,
                                now.saturating_sub(started_at),
                                now,
                            ))
                            .await;
                    }
                    Ok(TaskOutcome::Pending(fut)) => {
                        {
                            let mut inner = core.lock_inner();
                            // The entry may have been disposed during the
                            // invocation; the settlement is still watched
                            // so a late failure gets reported.
                            if let Some(entry) = inner.queue.get_mut(id) {
                                entry.pending = true;
                            }
                        }
                        tokio::spawn(RunnerCore::watch_settlement(
                            Arc::clone(core),
                            id,
                            interval_ms,
                            started_at,
                            fut,
                        ));
                    }
                    Err(err) => {
                        // Failures are isolated per task; the pass moves on.
                        warn!(task_id = %id, error = %err, "task invocation failed");
                        let now = core.clock.now_ms();
                        core.events
                            .emit(Event::task_failed(id, err.to_string(), false, now))
                            .await;
                    }
                }
            }
        }
    }

    /// Async gate, settlement side: await the pending result, observe the
    /// cooldown, clear the pending flag, and honor a queued continuation
    /// unless the runner has been stopped meanwhile.
    /// Returns a boxed future with an explicit `Send` bound: the mutual
    /// recursion with [`evaluate`](RunnerCore::evaluate) would otherwise
    /// make `Send` inference cyclic.
    fn watch_settlement(
        core: Arc<RunnerCore>,
        id: TaskId,
        interval_ms: u64,
        started_at: u64,
        fut: TaskFuture,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            let result = fut.await;

            // Cooldown smooths bursts where settlement latency is comparable
            // to the interval itself; zero for one-shots, which are gone from
            // the queue already.
            let cooldown_ms = interval_ms / 2;
            if cooldown_ms > 0 {
                tokio::time::sleep(Duration::from_millis(cooldown_ms)).await;
            }

            let (rerun, stopped) = {
                let mut inner = core.lock_inner();
                let stopped = inner.state == RunnerState::Stopped;
                let running = inner.state == RunnerState::Running;
                let mut rerun = false;
                if let Some(entry) = inner.queue.get_mut(id) {
                    entry.pending = false;
                    let continuation = std::mem::take(&mut entry.continuation);
                    rerun = continuation && running;
                }
                (rerun, stopped)
            };

            let now = core.clock.now_ms();
            match result {
                Ok(()) => {
                    core.events
                        .emit(Event::task_completed(
                            id,
                            now.saturating_sub(started_at),
                            now,
                        ))
                        .await;
                }
                Err(err) => {
                    // A rejection after stop() is reported, not swallowed;
                    // only the continuation is suppressed.
                    warn!(task_id = %id, error = %err, after_stop = stopped, "async task failed");
                    core.events
                        .emit(Event::task_failed(id, err.to_string(), stopped, now))
                        .await;
                }
            }

            if rerun {
                RunnerCore::evaluate(&core, id).await;
            }
        })
    }
}

/// A lightweight, embeddable recurring-task runner.
///
/// Register callbacks with [`add`](TaskRunner::add); the runner invokes
/// each one whose due time has arrived, once per interval, in insertion
/// order. A callback returning [`TaskOutcome::Pending`] is never invoked
/// again until the returned future settles (plus a cooldown of half its
/// interval).
///
/// Cloning a runner yields another handle to the same instance. All
/// methods must be called within a tokio runtime.
#[derive(Clone)]
pub struct TaskRunner {
    core: Arc<RunnerCore>,
}

impl TaskRunner {
    /// Create a runner with default configuration.
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::new())
    }

    /// Shorthand for a configuration consisting only of an init hook.
    pub fn with_init(hook: impl FnOnce(&TaskRunner) + Send + 'static) -> Self {
        Self::with_config(RunnerConfig::new().on_init(hook))
    }

    /// Create a runner from a configuration.
    pub fn with_config(mut config: RunnerConfig) -> Self {
        let on_init = config.on_init.take();
        let core = Arc::new(RunnerCore {
            inner: Mutex::new(Inner {
                queue: TaskQueue::new(),
                state: RunnerState::Ready,
                loop_epoch: 0,
            }),
            clock: config
                .clock
                .unwrap_or_else(|| Arc::new(MonotonicClock::new())),
            events: EventBus::new(),
            tick_period: config.tick_period.unwrap_or(DEFAULT_TICK_PERIOD),
            start_on_add: config.start_on_add,
            wake: Notify::new(),
        });
        let runner = Self { core };
        if let Some(hook) = on_init {
            hook(&runner);
        }
        runner
    }

    /// Register a callback.
    ///
    /// `options` is a bare interval in milliseconds, a `Duration`, or an
    /// [`AddOptions`] value; an absent or zero interval marks a one-shot
    /// task, invoked exactly once and removed. Registering the same
    /// callback (`Arc` identity) with the same interval twice is a no-op;
    /// the returned [`Disposer`] then addresses the existing entry.
    ///
    /// Adding to an idle runner wakes it; adding to a never-started
    /// runner starts it iff `start_on_add` was configured.
    pub fn add(&self, callback: Arc<dyn TaskFn>, options: impl Into<AddOptions>) -> Disposer {
        let (interval_ms, args, scope) = options.into().into_parts();
        let (id, spawn) = {
            let mut inner = self.core.lock_inner();
            let (id, inserted) = inner.queue.insert(callback, interval_ms, args, scope);
            if inserted {
                debug!(task_id = %id, interval_ms, "task registered");
            } else {
                debug!(task_id = %id, interval_ms, "duplicate registration ignored");
            }
            let wake = match inner.state {
                RunnerState::Idle => true,
                RunnerState::Ready => self.core.start_on_add,
                _ => false,
            };
            let spawn = if wake {
                inner.state = RunnerState::Running;
                inner.loop_epoch += 1;
                Some(inner.loop_epoch)
            } else {
                None
            };
            (id, spawn)
        };
        if let Some(epoch) = spawn {
            RunnerCore::spawn_loop(Arc::clone(&self.core), epoch);
        }
        Disposer {
            core: Arc::downgrade(&self.core),
            id,
        }
    }

    /// Number of tasks currently queued.
    pub fn size(&self) -> usize {
        self.core.lock_inner().queue.len()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunnerState {
        self.core.lock_inner().state
    }

    /// The runner's event bus, for registering [`EventHandler`]s.
    ///
    /// [`EventHandler`]: crate::events::EventHandler
    pub fn event_bus(&self) -> &EventBus {
        &self.core.events
    }

    /// Start the scheduling loop.
    ///
    /// A no-op while already running, and in the stopped state (which is
    /// terminal until [`destroy`](TaskRunner::destroy)).
    pub fn start(&self) -> &Self {
        let spawn = {
            let mut inner = self.core.lock_inner();
            match inner.state {
                RunnerState::Running | RunnerState::Stopped => None,
                RunnerState::Ready | RunnerState::Idle => {
                    inner.state = RunnerState::Running;
                    inner.loop_epoch += 1;
                    Some(inner.loop_epoch)
                }
            }
        };
        if let Some(epoch) = spawn {
            RunnerCore::spawn_loop(Arc::clone(&self.core), epoch);
        }
        self
    }

    /// Stop the runner.
    ///
    /// Takes effect before the next tick. Tasks already pending on an
    /// asynchronous result are not invoked again when it settles: the
    /// continuation is dropped, and a late rejection is reported on the
    /// event bus with `after_stop: true` rather than discarded.
    pub fn stop(&self) -> &Self {
        {
            let mut inner = self.core.lock_inner();
            if inner.state != RunnerState::Stopped {
                debug!("runner stopping");
                inner.state = RunnerState::Stopped;
            }
        }
        self.core.wake.notify_waiters();
        self
    }

    /// Stop the runner, clear the queue, and reset to the ready state.
    ///
    /// A subsequent [`add`](TaskRunner::add) behaves as on a fresh
    /// instance.
    pub fn destroy(&self) {
        self.stop();
        let mut inner = self.core.lock_inner();
        inner.queue.clear();
        inner.state = RunnerState::Ready;
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.core.lock_inner();
        f.debug_struct("TaskRunner")
            .field("state", &inner.state)
            .field("size", &inner.queue.len())
            .finish()
    }
}

/// Removes a specific task from its runner's queue.
///
/// Returned by [`TaskRunner::add`]. Calling [`dispose`](Disposer::dispose)
/// more than once, or after the task is already gone, is a no-op.
pub struct Disposer {
    core: Weak<RunnerCore>,
    id: TaskId,
}

impl Disposer {
    /// Remove the task if it is still queued.
    pub fn dispose(&self) {
        if let Some(core) = self.core.upgrade() {
            let mut inner = core.lock_inner();
            if inner.queue.remove(self.id) {
                debug!(task_id = %self.id, "task disposed");
            }
        }
    }

    /// Identifier of the task this disposer addresses.
    pub fn task_id(&self) -> TaskId {
        self.id
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer").field("id", &self.id).finish()
    }
}
