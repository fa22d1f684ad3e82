//! In-memory pending queue with priority tiers and retry-to-front insertion.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::{Priority, Task};

/// Wrapper to make a [`Task`] orderable by priority (highest first), then by
/// position within its tier (lowest sequence first).
///
/// Fresh submissions take increasing positive sequence numbers; retries take
/// decreasing negative ones, which places each retry at the very front of its
/// tier.
struct QueuedTask {
    priority: Priority,
    seq: i64,
    task: Task,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first
        match self.priority.cmp(&other.priority) {
            // Lower sequence first (reversed for max-heap)
            Ordering::Equal => other.seq.cmp(&self.seq),
            other => other,
        }
    }
}

/// In-memory queue of pending tasks using a priority heap.
/// This provides O(log n) push and O(log n) pop operations.
pub struct InMemoryQueue {
    tasks: BinaryHeap<QueuedTask>,
    next_back: i64,
    next_front: i64,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: BinaryHeap::new(),
            next_back: 0,
            next_front: -1,
        }
    }

    /// Append a fresh task behind every task of its priority.
    pub fn push(&mut self, task: Task) {
        let seq = self.next_back;
        self.next_back += 1;
        self.tasks.push(QueuedTask {
            priority: task.priority(),
            seq,
            task,
        });
    }

    /// Insert a retried task ahead of every task of its priority.
    pub fn push_front(&mut self, task: Task) {
        let seq = self.next_front;
        self.next_front -= 1;
        self.tasks.push(QueuedTask {
            priority: task.priority(),
            seq,
            task,
        });
    }

    /// Remove the next task to dispatch.
    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop().map(|queued| queued.task)
    }

    /// Priority of the next task to dispatch.
    #[must_use]
    pub fn peek_priority(&self) -> Option<Priority> {
        self.tasks.peek().map(|queued| queued.priority)
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
