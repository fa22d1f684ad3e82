//! Observability notifications and sinks.
//!
//! Events describe what the coordinator did; callers never depend on them for
//! results. Sinks run outside the coordinator's critical section, but they
//! should still return quickly.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{Priority, TaskId, WorkerId};

/// Lifecycle notification emitted by a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum PoolEvent {
    /// A worker slot was added.
    WorkerCreated {
        /// New worker.
        worker_id: WorkerId,
        /// Registry size afterwards.
        total_workers: usize,
    },
    /// A worker slot was removed.
    WorkerDestroyed {
        /// Removed worker.
        worker_id: WorkerId,
        /// Registry size afterwards.
        total_workers: usize,
    },
    /// A task entered the pending queue.
    TaskQueued {
        /// Task.
        task_id: TaskId,
        /// Its priority.
        priority: Priority,
        /// Queue length afterwards.
        queue_size: usize,
    },
    /// An attempt was dispatched to a worker.
    TaskStarted {
        /// Task.
        task_id: TaskId,
        /// Worker running the attempt.
        worker_id: WorkerId,
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Milliseconds since submission.
        wait_ms: u64,
    },
    /// A task resolved successfully.
    TaskCompleted {
        /// Task.
        task_id: TaskId,
        /// Worker that ran the final attempt.
        worker_id: WorkerId,
        /// Milliseconds spent in the final attempt.
        duration_ms: u64,
    },
    /// An attempt failed and the task went back to the front of its tier.
    TaskRetrying {
        /// Task.
        task_id: TaskId,
        /// Worker that ran the failed attempt.
        worker_id: WorkerId,
        /// Failed attempt number.
        attempt: u32,
        /// Attempt budget.
        max_attempts: u32,
        /// Failure description.
        error: String,
    },
    /// A task failed permanently.
    TaskFailed {
        /// Task.
        task_id: TaskId,
        /// Worker that ran the final attempt.
        worker_id: WorkerId,
        /// Terminal error.
        error: String,
        /// Attempts made.
        attempts: u32,
    },
    /// The autoscaler grew the registry.
    ScaledUp {
        /// Workers added.
        added: usize,
        /// Registry size afterwards.
        total: usize,
        /// Pending tasks that triggered the growth.
        queue_size: usize,
    },
    /// The idle reaper shrank the registry.
    ScaledDown {
        /// Workers removed.
        removed: usize,
        /// Registry size afterwards.
        total: usize,
    },
    /// The pool drained and released every worker.
    Shutdown {
        /// Tasks resolved successfully over the pool's life.
        tasks_completed: u64,
        /// Tasks failed permanently over the pool's life.
        tasks_failed: u64,
    },
}

impl PoolEvent {
    /// Kebab-case event name, as used in the serialized form.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::WorkerCreated { .. } => "worker-created",
            Self::WorkerDestroyed { .. } => "worker-destroyed",
            Self::TaskQueued { .. } => "task-queued",
            Self::TaskStarted { .. } => "task-started",
            Self::TaskCompleted { .. } => "task-completed",
            Self::TaskRetrying { .. } => "task-retrying",
            Self::TaskFailed { .. } => "task-failed",
            Self::ScaledUp { .. } => "scaled-up",
            Self::ScaledDown { .. } => "scaled-down",
            Self::Shutdown { .. } => "shutdown",
        }
    }
}

/// Event sink abstraction.
pub trait EventSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: &PoolEvent);
}

/// In-memory sink with a bounded buffer, for testing and dev.
///
/// Clones share the same buffer, so a test can keep one handle and give the
/// other to the pool.
#[derive(Clone)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<VecDeque<PoolEvent>>>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Create a sink keeping at most `max_events` events.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<PoolEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Stored events matching `filter`.
    #[must_use]
    pub fn matching<F>(&self, filter: F) -> Vec<PoolEvent>
    where
        F: Fn(&PoolEvent) -> bool,
    {
        self.events.lock().iter().filter(|e| filter(e)).cloned().collect()
    }

    /// Task ids of `task-started` events, in dispatch order.
    #[must_use]
    pub fn dispatch_order(&self) -> Vec<TaskId> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                PoolEvent::TaskStarted { task_id, .. } => Some(*task_id),
                _ => None,
            })
            .collect()
    }

    /// Drop every stored event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for InMemoryEventSink {
    fn record(&self, event: &PoolEvent) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event.clone());
    }
}

/// Sink writing each event as a JSON line on the `prometheus_task_pool::events`
/// tracing target, for collectors that scrape structured logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: &PoolEvent) {
        match serde_json::to_string(event) {
            Ok(json) => tracing::info!(
                target: "prometheus_task_pool::events",
                event = event.name(),
                "{json}"
            ),
            Err(e) => tracing::error!("failed to serialize pool event: {e}"),
        }
    }
}

/// Fan-out of events to tracing and every attached sink.
#[derive(Clone, Default)]
pub(crate) struct EventBus {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventBus {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn emit_all(&self, pool: &str, events: Vec<PoolEvent>) {
        for event in events {
            log_event(pool, &event);
            for sink in &self.sinks {
                sink.record(&event);
            }
        }
    }
}

fn log_event(pool: &str, event: &PoolEvent) {
    use tracing::{debug, info, trace, warn};

    match event {
        PoolEvent::WorkerCreated {
            worker_id,
            total_workers,
        } => {
            debug!(pool, %worker_id, total_workers, "worker created");
        }
        PoolEvent::WorkerDestroyed {
            worker_id,
            total_workers,
        } => {
            debug!(pool, %worker_id, total_workers, "worker destroyed");
        }
        PoolEvent::TaskQueued {
            task_id,
            priority,
            queue_size,
        } => {
            trace!(pool, %task_id, priority = priority.0, queue_size, "task queued");
        }
        PoolEvent::TaskStarted {
            task_id,
            worker_id,
            attempt,
            wait_ms,
        } => {
            debug!(pool, %task_id, %worker_id, attempt, wait_ms, "task started");
        }
        PoolEvent::TaskCompleted {
            task_id,
            worker_id,
            duration_ms,
        } => {
            debug!(pool, %task_id, %worker_id, duration_ms, "task completed");
        }
        PoolEvent::TaskRetrying {
            task_id,
            attempt,
            max_attempts,
            error,
            ..
        } => {
            warn!(pool, %task_id, attempt, max_attempts, error = %error, "retrying task");
        }
        PoolEvent::TaskFailed {
            task_id,
            error,
            attempts,
            ..
        } => {
            warn!(pool, %task_id, attempts, error = %error, "task failed permanently");
        }
        PoolEvent::ScaledUp {
            added,
            total,
            queue_size,
        } => {
            info!(pool, added, total, queue_size, "scaled up");
        }
        PoolEvent::ScaledDown { removed, total } => {
            info!(pool, removed, total, "scaled down");
        }
        PoolEvent::Shutdown {
            tasks_completed,
            tasks_failed,
        } => {
            info!(pool, tasks_completed, tasks_failed, "pool shut down");
        }
    }
}
