//! Lifecycle events and event handling.
//!
//! This module provides event emission for task and runner lifecycle
//! events. It doubles as the error-reporting side channel: task failures,
//! including asynchronous results that settle after `stop()`, are always
//! surfaced here rather than silently discarded.
//!
//! Timestamps are millisecond readings from the runner's [`Clock`]
//! (arbitrary epoch, monotonic).
//!
//! [`Clock`]: crate::Clock

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::types::TaskId;

/// Lifecycle events emitted by a runner.
#[derive(Debug, Clone)]
pub enum Event {
    /// A task callback was invoked.
    TaskInvoked { task_id: TaskId, timestamp_ms: u64 },

    /// A task invocation completed successfully.
    ///
    /// For asynchronous tasks this fires at settlement; `duration_ms`
    /// spans from invocation start to settlement.
    TaskCompleted {
        task_id: TaskId,
        duration_ms: u64,
        timestamp_ms: u64,
    },

    /// A task invocation failed, synchronously or at settlement.
    ///
    /// `after_stop` marks an asynchronous result that settled after the
    /// runner was stopped; no further invocation follows it.
    TaskFailed {
        task_id: TaskId,
        error: String,
        after_stop: bool,
        timestamp_ms: u64,
    },

    /// A tick reached a task whose previous invocation is still pending;
    /// its re-evaluation was queued (or refreshed) for settlement.
    TaskDeferred { task_id: TaskId, timestamp_ms: u64 },

    /// The scheduling loop began ticking.
    RunnerStarted { timestamp_ms: u64 },

    /// The queue drained and the loop suspended.
    RunnerIdle { timestamp_ms: u64 },

    /// The runner was stopped explicitly.
    RunnerStopped { timestamp_ms: u64 },
}

impl Event {
    /// Get the clock timestamp of the event in milliseconds.
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            Event::TaskInvoked { timestamp_ms, .. } => *timestamp_ms,
            Event::TaskCompleted { timestamp_ms, .. } => *timestamp_ms,
            Event::TaskFailed { timestamp_ms, .. } => *timestamp_ms,
            Event::TaskDeferred { timestamp_ms, .. } => *timestamp_ms,
            Event::RunnerStarted { timestamp_ms } => *timestamp_ms,
            Event::RunnerIdle { timestamp_ms } => *timestamp_ms,
            Event::RunnerStopped { timestamp_ms } => *timestamp_ms,
        }
    }

    /// Create a TaskInvoked event.
    pub fn task_invoked(task_id: TaskId, timestamp_ms: u64) -> Self {
        Event::TaskInvoked {
            task_id,
            timestamp_ms,
        }
    }

    /// Create a TaskCompleted event.
    pub fn task_completed(task_id: TaskId, duration_ms: u64, timestamp_ms: u64) -> Self {
        Event::TaskCompleted {
            task_id,
            duration_ms,
            timestamp_ms,
        }
    }

    /// Create a TaskFailed event.
    pub fn task_failed(
        task_id: TaskId,
        error: String,
        after_stop: bool,
        timestamp_ms: u64,
    ) -> Self {
        Event::TaskFailed {
            task_id,
            error,
            after_stop,
            timestamp_ms,
        }
    }

    /// Create a TaskDeferred event.
    pub fn task_deferred(task_id: TaskId, timestamp_ms: u64) -> Self {
        Event::TaskDeferred {
            task_id,
            timestamp_ms,
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    /// Test handler that records received events.
    struct RecordingHandler {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingHandler {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }

        async fn events(&self) -> Vec<Event> {
            self.events.lock().await.clone()
        }
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: &Event) {
            self.events.lock().await.push(event.clone());
        }
    }

    /// Test handler that counts events.
    struct CountingHandler {
        count: AtomicU32,
    }

    impl CountingHandler {
        fn new() -> Self {
            Self {
                count: AtomicU32::new(0),
            }
        }

        fn count(&self) -> u32 {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &Event) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_emit_task_invoked_event() {
        let handler = Arc::new(RecordingHandler::new());
        let bus = EventBus::new();
        bus.register(handler.clone()).await;

        bus.emit(Event::task_invoked(TaskId::new(3), 120)).await;

        let events = handler.events().await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::TaskInvoked {
                task_id,
                timestamp_ms,
            } => {
                assert_eq!(*task_id, TaskId::new(3));
                assert_eq!(*timestamp_ms, 120);
            }
            _ => panic!("Expected TaskInvoked event"),
        }
    }

    #[tokio::test]
    async fn test_emit_task_failed_event_with_error() {
        let handler = Arc::new(RecordingHandler::new());
        let bus = EventBus::new();
        bus.register(handler.clone()).await;

        bus.emit(Event::task_failed(
            TaskId::new(1),
            "connection refused".to_string(),
            false,
            64,
        ))
        .await;

        let events = handler.events().await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::TaskFailed {
                error, after_stop, ..
            } => {
                assert_eq!(error, "connection refused");
                assert!(!after_stop);
            }
            _ => panic!("Expected TaskFailed event"),
        }
    }

    #[tokio::test]
    async fn test_after_stop_failures_are_marked() {
        let handler = Arc::new(RecordingHandler::new());
        let bus = EventBus::new();
        bus.register(handler.clone()).await;

        bus.emit(Event::task_failed(
            TaskId::new(2),
            "late rejection".to_string(),
            true,
            500,
        ))
        .await;

        let events = handler.events().await;
        assert!(matches!(
            events[0],
            Event::TaskFailed {
                after_stop: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_register_event_handler() {
        let bus = EventBus::new();
        assert_eq!(bus.handler_count().await, 0);

        let handler = Arc::new(CountingHandler::new());
        bus.register(handler).await;
        assert_eq!(bus.handler_count().await, 1);
    }

    #[tokio::test]
    async fn test_multiple_handlers_receive_same_event() {
        let handler1 = Arc::new(CountingHandler::new());
        let handler2 = Arc::new(CountingHandler::new());

        let bus = EventBus::new();
        bus.register(handler1.clone()).await;
        bus.register(handler2.clone()).await;

        bus.emit(Event::RunnerStarted { timestamp_ms: 0 }).await;

        assert_eq!(handler1.count(), 1);
        assert_eq!(handler2.count(), 1);
    }

    #[tokio::test]
    async fn test_multiple_events_in_sequence() {
        let handler = Arc::new(RecordingHandler::new());
        let bus = EventBus::new();
        bus.register(handler.clone()).await;

        bus.emit(Event::task_invoked(TaskId::new(0), 0)).await;
        bus.emit(Event::task_completed(TaskId::new(0), 5, 5)).await;
        bus.emit(Event::task_deferred(TaskId::new(1), 10)).await;
        bus.emit(Event::RunnerIdle { timestamp_ms: 15 }).await;

        let events = handler.events().await;
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], Event::TaskInvoked { .. }));
        assert!(matches!(events[1], Event::TaskCompleted { .. }));
        assert!(matches!(events[2], Event::TaskDeferred { .. }));
        assert!(matches!(events[3], Event::RunnerIdle { .. }));
    }

    #[tokio::test]
    async fn test_no_handlers_does_not_panic() {
        let bus = EventBus::new();
        bus.emit(Event::RunnerStopped { timestamp_ms: 1 }).await;
    }

    #[test]
    fn test_event_timestamp_accessor() {
        let event = Event::task_completed(TaskId::new(4), 30, 130);
        assert_eq!(event.timestamp_ms(), 130);
    }
}
