//! Worker registry: bookkeeping for execution-context slots.
//!
//! A worker is a logical slot; the execution context that runs an attempt is
//! spawned per attempt and referenced from the slot only while it runs. The
//! registry is only ever mutated inside the coordinator's critical section.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::TaskId;

/// Identifier of a worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// One execution-context slot.
///
/// Busy exactly when `current_task` is set.
#[derive(Debug)]
pub struct Worker {
    id: WorkerId,
    current_task: Option<TaskId>,
    execution: Option<AbortHandle>,
    last_used: Instant,
    tasks_completed: u64,
    created_at: Instant,
}

impl Worker {
    fn new(id: WorkerId, now: Instant) -> Self {
        Self {
            id,
            current_task: None,
            execution: None,
            last_used: now,
            tasks_completed: 0,
            created_at: now,
        }
    }

    /// Slot identifier.
    #[must_use]
    pub const fn id(&self) -> WorkerId {
        self.id
    }

    /// Whether the slot is running a task.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.current_task.is_some()
    }

    /// Task currently running on the slot.
    #[must_use]
    pub const fn current_task(&self) -> Option<TaskId> {
        self.current_task
    }

    /// Last time the slot finished a task (or its creation time).
    #[must_use]
    pub const fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Successful tasks run on this slot.
    #[must_use]
    pub const fn tasks_completed(&self) -> u64 {
        self.tasks_completed
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Snapshot suitable for reporting.
    #[must_use]
    pub fn info(&self, now: Instant) -> WorkerInfo {
        WorkerInfo {
            id: self.id,
            busy: self.is_busy(),
            current_task: self.current_task,
            tasks_completed: self.tasks_completed,
            idle_ms: if self.is_busy() {
                0
            } else {
                crate::util::duration_ms(now.saturating_duration_since(self.last_used))
            },
            age_ms: crate::util::duration_ms(now.saturating_duration_since(self.created_at)),
        }
    }

    fn abort_execution(&mut self) {
        if let Some(handle) = self.execution.take() {
            handle.abort();
        }
    }
}

/// Reportable view of a worker slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Slot identifier.
    pub id: WorkerId,
    /// Whether a task is running.
    pub busy: bool,
    /// Task being run, if any.
    pub current_task: Option<TaskId>,
    /// Successful tasks run on this slot.
    pub tasks_completed: u64,
    /// Milliseconds since the slot last went idle (0 while busy).
    pub idle_ms: u64,
    /// Milliseconds since the slot was created.
    pub age_ms: u64,
}

/// Registry of worker slots, ordered by creation.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: BTreeMap<WorkerId, Worker>,
    next_id: u64,
}

impl WorkerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new idle worker and return its id.
    pub fn create(&mut self, now: Instant) -> WorkerId {
        self.next_id += 1;
        let id = WorkerId(self.next_id);
        self.workers.insert(id, Worker::new(id, now));
        id
    }

    /// Remove an idle worker. Busy workers are never preempted: returns
    /// `false` and leaves the registry untouched if `id` is busy or unknown.
    pub fn destroy(&mut self, id: WorkerId) -> bool {
        match self.workers.get(&id) {
            Some(worker) if !worker.is_busy() => {
                if let Some(mut worker) = self.workers.remove(&id) {
                    worker.abort_execution();
                }
                true
            }
            _ => false,
        }
    }

    /// Oldest idle worker, if any.
    #[must_use]
    pub fn find_available(&self) -> Option<WorkerId> {
        self.workers
            .values()
            .find(|worker| !worker.is_busy())
            .map(Worker::id)
    }

    /// Mark `id` busy with `task`, keeping the execution handle for
    /// termination. Returns `false` if the worker is unknown or busy.
    pub fn assign(&mut self, id: WorkerId, task: TaskId, execution: AbortHandle) -> bool {
        match self.workers.get_mut(&id) {
            Some(worker) if !worker.is_busy() => {
                worker.current_task = Some(task);
                worker.execution = Some(execution);
                true
            }
            _ => false,
        }
    }

    /// Return `id` to the idle set after an attempt. The execution context is
    /// discarded either way; `succeeded` bumps the completion counter.
    pub fn release(&mut self, id: WorkerId, now: Instant, succeeded: bool) {
        if let Some(worker) = self.workers.get_mut(&id) {
            worker.abort_execution();
            worker.current_task = None;
            worker.last_used = now;
            if succeeded {
                worker.tasks_completed += 1;
            }
        }
    }

    /// Idle workers whose idle time exceeds `idle_timeout`, oldest first.
    #[must_use]
    pub fn expired_idle(&self, now: Instant, idle_timeout: Duration) -> Vec<WorkerId> {
        self.workers
            .values()
            .filter(|w| !w.is_busy() && now.saturating_duration_since(w.last_used) > idle_timeout)
            .map(Worker::id)
            .collect()
    }

    /// Look up a worker.
    #[must_use]
    pub fn get(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.get(&id)
    }

    /// Iterate over workers in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    /// Total workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Workers currently running a task.
    #[must_use]
    pub fn busy_count(&self) -> usize {
        self.workers.values().filter(|w| w.is_busy()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_handle() -> AbortHandle {
        tokio::spawn(std::future::pending::<()>()).abort_handle()
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_and_find_available() {
        let mut registry = WorkerRegistry::new();
        assert_eq!(registry.find_available(), None);

        let a = registry.create(Instant::now());
        let b = registry.create(Instant::now());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find_available(), Some(a));

        assert!(registry.assign(a, TaskId(1), dummy_handle()));
        assert_eq!(registry.find_available(), Some(b));
        assert_eq!(registry.busy_count(), 1);
        assert!(registry.get(a).unwrap().is_busy());
        assert_eq!(registry.get(a).unwrap().current_task(), Some(TaskId(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_worker_is_never_destroyed() {
        let mut registry = WorkerRegistry::new();
        let a = registry.create(Instant::now());
        assert!(registry.assign(a, TaskId(1), dummy_handle()));
        assert!(!registry.assign(a, TaskId(2), dummy_handle()));

        assert!(!registry.destroy(a));
        assert_eq!(registry.len(), 1);

        registry.release(a, Instant::now(), true);
        assert!(!registry.get(a).unwrap().is_busy());
        assert_eq!(registry.get(a).unwrap().tasks_completed(), 1);
        assert!(registry.destroy(a));
        assert!(registry.is_empty());
        assert!(!registry.destroy(a));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_after_failure_does_not_count() {
        let mut registry = WorkerRegistry::new();
        let a = registry.create(Instant::now());
        registry.assign(a, TaskId(1), dummy_handle());
        registry.release(a, Instant::now(), false);
        let worker = registry.get(a).unwrap();
        assert!(!worker.is_busy());
        assert_eq!(worker.tasks_completed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_idle() {
        let mut registry = WorkerRegistry::new();
        let a = registry.create(Instant::now());
        tokio::time::advance(Duration::from_secs(30)).await;
        let b = registry.create(Instant::now());
        let c = registry.create(Instant::now());
        registry.assign(c, TaskId(9), dummy_handle());
        tokio::time::advance(Duration::from_secs(40)).await;

        let expired = registry.expired_idle(Instant::now(), Duration::from_secs(60));
        assert_eq!(expired, vec![a]);

        tokio::time::advance(Duration::from_secs(30)).await;
        let expired = registry.expired_idle(Instant::now(), Duration::from_secs(60));
        assert_eq!(expired, vec![a, b]);

        let info = registry.get(a).unwrap().info(Instant::now());
        assert_eq!(info.idle_ms, 100_000);
        assert!(!info.busy);
    }
}
