//! Insertion-ordered task queue with dedup-on-insert.
//!
//! The queue is the only container of task entries. It preserves
//! registration order (the runner's sole ordering guarantee) and rejects
//! a second registration of the same callback with the same interval.
//! Lookups are linear scans; queues are expected to hold tens of entries,
//! not millions.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;

use crate::core::task::TaskFn;
use crate::core::types::TaskId;

/// One registered callback plus its schedule and runtime state.
pub(crate) struct TaskEntry {
    pub(crate) id: TaskId,
    pub(crate) callback: Arc<dyn TaskFn>,
    pub(crate) args: Arc<Vec<Value>>,
    pub(crate) scope: Option<Arc<dyn Any + Send + Sync>>,
    /// Milliseconds between invocations; 0 marks a one-shot.
    pub(crate) interval_ms: u64,
    /// Clock timestamp of the last invocation start.
    pub(crate) last_run_at: Option<u64>,
    /// An asynchronous invocation has not yet settled.
    pub(crate) pending: bool,
    /// A re-evaluation is queued for when the pending result settles.
    /// At most one; later ticks coalesce into it.
    pub(crate) continuation: bool,
}

/// Insertion-ordered container of task entries.
pub(crate) struct TaskQueue {
    entries: Vec<TaskEntry>,
    next_id: u64,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Insert a new entry unless an identical `(callback, interval)` pair
    /// is already queued. Identity is the callback's `Arc` allocation.
    ///
    /// Returns the entry's id and whether a new entry was created; for a
    /// duplicate the existing entry's id is returned.
    pub(crate) fn insert(
        &mut self,
        callback: Arc<dyn TaskFn>,
        interval_ms: u64,
        args: Arc<Vec<Value>>,
        scope: Option<Arc<dyn Any + Send + Sync>>,
    ) -> (TaskId, bool) {
        if let Some(existing) = self.entries.iter().find(|e| {
            e.interval_ms == interval_ms && Arc::ptr_eq(&e.callback, &callback)
        }) {
            return (existing.id, false);
        }

        let id = TaskId::new(self.next_id);
        self.next_id += 1;
        self.entries.push(TaskEntry {
            id,
            callback,
            args,
            scope,
            interval_ms,
            last_run_at: None,
            pending: false,
            continuation: false,
        });
        (id, true)
    }

    /// Remove an entry by id. Returns whether it was present.
    pub(crate) fn remove(&mut self, id: TaskId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Identity lookup for an entry still in the live queue.
    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Snapshot of entry ids in insertion order. The evaluation cycle
    /// iterates this copy so in-pass removals and additions do not affect
    /// the set of tasks considered by the current pass.
    pub(crate) fn ids(&self) -> Vec<TaskId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
