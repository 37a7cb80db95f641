//! Core identifier types for the runner.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a registered task within one runner.
///
/// Ids are assigned in registration order and are never reused by the
/// runner that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    /// Create a TaskId from a raw value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_creation() {
        let id = TaskId::new(7);
        assert_eq!(id.as_u64(), 7);
    }

    #[test]
    fn test_task_id_display() {
        let id = TaskId::new(42);
        assert_eq!(format!("{}", id), "42");
    }

    #[test]
    fn test_task_id_equality() {
        let id1 = TaskId::new(1);
        let id2 = TaskId::new(1);
        let id3 = TaskId::new(2);

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_task_ids_are_ordered_by_registration() {
        let earlier = TaskId::new(3);
        let later = TaskId::new(9);
        assert!(earlier < later);
    }

    #[test]
    fn test_task_ids_are_hashable() {
        use std::collections::HashSet;

        let mut ids: HashSet<TaskId> = HashSet::new();
        ids.insert(TaskId::new(1));
        ids.insert(TaskId::new(2));
        ids.insert(TaskId::new(1)); // duplicate

        assert_eq!(ids.len(), 2);
    }
}
