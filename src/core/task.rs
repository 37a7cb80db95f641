//! Task callbacks, invocation outcomes, and registration options.
//!
//! A task is an opaque invocable implementing [`TaskFn`]. Each invocation
//! receives a [`TaskContext`] (arguments, optional scope object, and the
//! entry's own metadata) and yields a [`TaskOutcome`]: either the work is
//! done immediately, or it continues as a future that the runner's async
//! gate tracks until settlement.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use super::types::TaskId;

/// Errors produced by task invocations.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task execution failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    /// Create an execution failure from a message.
    pub fn failed(msg: impl Into<String>) -> Self {
        TaskError::ExecutionFailed(msg.into())
    }
}

/// The deferred half of an asynchronous invocation.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'static>>;

/// Result of one task invocation.
///
/// This is the explicit immediate-vs-deferred tag the runner dispatches
/// on; there is no runtime shape inspection of return values.
pub enum TaskOutcome {
    /// The invocation completed synchronously.
    Done,
    /// The invocation continues asynchronously; the runner will not
    /// invoke this task again until the future settles.
    Pending(TaskFuture),
}

impl TaskOutcome {
    /// Wrap a future as a pending outcome.
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        TaskOutcome::Pending(Box::pin(fut))
    }

    /// Whether this outcome completed synchronously.
    pub fn is_done(&self) -> bool {
        matches!(self, TaskOutcome::Done)
    }

    /// Whether this outcome is still pending.
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskOutcome::Pending(_))
    }
}

impl std::fmt::Debug for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::Done => f.write_str("Done"),
            TaskOutcome::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// The callable registered with a runner.
///
/// Closures of the matching signature implement this automatically:
///
/// ```ignore
/// let cb = recur::task_fn(|_ctx| Ok(TaskOutcome::Done));
/// runner.add(cb, 64);
/// ```
///
/// Registration identity is the `Arc` allocation: adding the same
/// `Arc<dyn TaskFn>` twice with the same interval is a no-op, while two
/// separately allocated closures are distinct tasks.
pub trait TaskFn: Send + Sync {
    /// Invoke the task once.
    fn call(&self, ctx: TaskContext) -> Result<TaskOutcome, TaskError>;
}

impl<F> TaskFn for F
where
    F: Fn(TaskContext) -> Result<TaskOutcome, TaskError> + Send + Sync,
{
    fn call(&self, ctx: TaskContext) -> Result<TaskOutcome, TaskError> {
        self(ctx)
    }
}

/// Wrap a closure as a shareable task callback.
pub fn task_fn<F>(f: F) -> Arc<dyn TaskFn>
where
    F: Fn(TaskContext) -> Result<TaskOutcome, TaskError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Metadata about the queue entry being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    /// Identifier assigned at registration.
    pub id: TaskId,
    /// Interval between invocations in milliseconds; 0 marks a one-shot.
    pub interval_ms: u64,
    /// Clock timestamp of the previous invocation start, if any.
    pub last_run_at: Option<u64>,
}

/// Execution context handed to every invocation.
///
/// Carries the registered arguments, the optional scope object, and the
/// entry's own metadata. When no scope was configured the task metadata
/// stands in for it.
#[derive(Clone)]
pub struct TaskContext {
    info: TaskInfo,
    args: Arc<Vec<Value>>,
    scope: Option<Arc<dyn Any + Send + Sync>>,
}

impl TaskContext {
    pub(crate) fn new(
        info: TaskInfo,
        args: Arc<Vec<Value>>,
        scope: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Self {
        Self { info, args, scope }
    }

    /// Metadata for the entry being invoked.
    pub fn task(&self) -> &TaskInfo {
        &self.info
    }

    /// The arguments registered with this task, in order.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Get a typed argument by position.
    ///
    /// Returns `None` if the index is out of range or deserialization
    /// fails.
    pub fn arg<T: serde::de::DeserializeOwned>(&self, index: usize) -> Option<T> {
        self.args
            .get(index)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Downcast the configured scope object.
    ///
    /// Returns `None` if no scope was set or the type does not match.
    pub fn scope<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.scope.as_ref().and_then(|s| s.downcast_ref::<T>())
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("info", &self.info)
            .field("args", &self.args)
            .field("has_scope", &self.scope.is_some())
            .finish()
    }
}

/// Options accepted by [`TaskRunner::add`](crate::TaskRunner::add).
///
/// A bare interval and a full options value both funnel through
/// `Into<AddOptions>` and are resolved once at the call boundary:
///
/// - `runner.add(cb, 64)`, a bare interval in milliseconds
/// - `runner.add(cb, Duration::from_millis(64))`
/// - `runner.add(cb, AddOptions::every(Duration::from_millis(64)).with_arg("job"))`
///
/// An absent or zero interval marks a one-shot task.
#[derive(Default)]
pub struct AddOptions {
    interval: Option<Duration>,
    args: Vec<Value>,
    scope: Option<Arc<dyn Any + Send + Sync>>,
}

impl AddOptions {
    /// Options for a one-shot task (no interval).
    pub fn once() -> Self {
        Self::default()
    }

    /// Options for a recurring task with the given interval.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval: Some(interval),
            ..Self::default()
        }
    }

    /// Set the invocation interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Replace the argument list.
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Append one argument.
    pub fn with_arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the scope object passed to every invocation.
    pub fn with_scope<T: Send + Sync + 'static>(mut self, scope: T) -> Self {
        self.scope = Some(Arc::new(scope));
        self
    }

    pub(crate) fn interval_ms(&self) -> u64 {
        self.interval.map(|d| d.as_millis() as u64).unwrap_or(0)
    }

    pub(crate) fn into_parts(self) -> (u64, Arc<Vec<Value>>, Option<Arc<dyn Any + Send + Sync>>) {
        let interval_ms = self.interval_ms();
        (interval_ms, Arc::new(self.args), self.scope)
    }
}

impl From<u64> for AddOptions {
    /// Bare interval shorthand, in milliseconds.
    fn from(interval_ms: u64) -> Self {
        AddOptions::every(Duration::from_millis(interval_ms))
    }
}

impl From<Duration> for AddOptions {
    fn from(interval: Duration) -> Self {
        AddOptions::every(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context_with(args: Vec<Value>, scope: Option<Arc<dyn Any + Send + Sync>>) -> TaskContext {
        let info = TaskInfo {
            id: TaskId::new(1),
            interval_ms: 64,
            last_run_at: None,
        };
        TaskContext::new(info, Arc::new(args), scope)
    }

    #[test]
    fn test_add_options_from_bare_interval() {
        let opts: AddOptions = 64u64.into();
        assert_eq!(opts.interval_ms(), 64);
        assert!(opts.args.is_empty());
    }

    #[test]
    fn test_add_options_from_duration() {
        let opts: AddOptions = Duration::from_secs(2).into();
        assert_eq!(opts.interval_ms(), 2000);
    }

    #[test]
    fn test_add_options_once_is_one_shot() {
        assert_eq!(AddOptions::once().interval_ms(), 0);
        assert_eq!(AddOptions::default().interval_ms(), 0);
    }

    #[test]
    fn test_add_options_builder() {
        let opts = AddOptions::every(Duration::from_millis(100))
            .with_arg("hello")
            .with_arg(7)
            .with_scope("ctx".to_string());

        assert_eq!(opts.interval_ms(), 100);
        assert_eq!(opts.args.len(), 2);
        assert!(opts.scope.is_some());
    }

    #[test]
    fn test_context_typed_args() {
        let ctx = context_with(vec![json!(21), json!("text")], None);

        let n: i32 = ctx.arg(0).unwrap();
        let s: String = ctx.arg(1).unwrap();
        assert_eq!(n, 21);
        assert_eq!(s, "text");

        assert_eq!(ctx.arg::<i32>(5), None);
        assert_eq!(ctx.arg::<i32>(1), None); // wrong type
    }

    #[test]
    fn test_context_scope_downcast() {
        let scope: Arc<dyn Any + Send + Sync> = Arc::new(String::from("receiver"));
        let ctx = context_with(vec![], Some(scope));

        assert_eq!(ctx.scope::<String>().map(String::as_str), Some("receiver"));
        assert!(ctx.scope::<i32>().is_none());
    }

    #[test]
    fn test_context_without_scope_exposes_task_metadata() {
        let ctx = context_with(vec![], None);

        assert!(ctx.scope::<String>().is_none());
        assert_eq!(ctx.task().id, TaskId::new(1));
        assert_eq!(ctx.task().interval_ms, 64);
    }

    #[test]
    fn test_outcome_tags() {
        assert!(TaskOutcome::Done.is_done());

        let pending = TaskOutcome::pending(async { Ok(()) });
        assert!(pending.is_pending());
    }

    #[test]
    fn test_closure_implements_task_fn() {
        let cb = task_fn(|ctx| {
            let doubled: i32 = ctx.arg::<i32>(0).unwrap_or(0) * 2;
            if doubled == 42 {
                Ok(TaskOutcome::Done)
            } else {
                Err(TaskError::failed("wrong answer"))
            }
        });

        let ok = cb.call(context_with(vec![json!(21)], None));
        assert!(ok.unwrap().is_done());

        let err = cb.call(context_with(vec![json!(1)], None));
        assert!(err.is_err());
    }

    #[test]
    fn test_task_error_display() {
        let err = TaskError::failed("boom");
        assert_eq!(err.to_string(), "execution failed: boom");
    }
}
