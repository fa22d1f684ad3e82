//! Dynamic worker pool with a priority task queue, retries, autoscaling, idle
//! reclamation and a per-pool resource lock manager.
//!
//! All coordinator state (pending queue, worker registry, active set,
//! metrics) sits behind one mutex owned by the pool instance and is only
//! touched inside short critical sections, which keeps queue and registry
//! consistent under concurrent completions. Work units run outside that
//! lock, each attempt in its own execution context under a watchdog.
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_task_pool::config::{PoolConfig, SubmitOptions};
//! use prometheus_task_pool::core::{BlockingWorkUnit, Priority, TaskPool};
//!
//! let pool = TaskPool::new(PoolConfig::new().with_min_workers(2).with_max_workers(8))?;
//! let hash = BlockingWorkUnit::new("password-hash", |password: String| hash_password(&password));
//!
//! let handle = pool.submit(hash, password, SubmitOptions::new().with_priority(Priority::HIGH))?;
//! let digest = handle.await?;
//!
//! pool.shutdown().await;
//! ```

mod dispatch;
mod scaling;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{PoolConfig, SubmitOptions};
use crate::infra::queue::InMemoryQueue;
use crate::runtime::TokioSpawner;

use super::events::{EventBus, EventSink, PoolEvent};
use super::executor::TypedJob;
use super::metrics::{utilization, PoolMetrics, PoolStats, TaskStats, WorkerStats};
use super::registry::{Worker, WorkerId, WorkerInfo, WorkerRegistry};
use super::{LockError, LockGuard, LockManager, PoolError, Task, TaskError, TaskId, WorkUnit};

/// Identifier of a pool instance, used to tell pools apart in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(pub Uuid);

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool-{}", self.0.simple())
    }
}

/// Caller's view of a submitted task: a future resolving to the work unit's
/// output, or to the terminal error once retries are exhausted.
#[must_use = "a task handle does nothing unless awaited"]
pub struct TaskHandle<O> {
    task_id: TaskId,
    rx: oneshot::Receiver<Result<O, TaskError>>,
}

impl<O> TaskHandle<O> {
    /// Identifier of the submitted task.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }
}

impl<O> fmt::Debug for TaskHandle<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}

impl<O> Future for TaskHandle<O> {
    type Output = Result<O, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let task_id = self.task_id;
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(PoolError::Task(err)),
            Err(_) => Err(PoolError::Internal(format!(
                "{task_id} was dropped before it resolved"
            ))),
        })
    }
}

/// A task that is running on a worker.
pub(crate) struct ActiveTask {
    pub task: Task,
    pub worker: WorkerId,
}

/// Coordinator state. Only mutated while the pool's state lock is held.
pub(crate) struct PoolState {
    pub queue: InMemoryQueue,
    pub registry: WorkerRegistry,
    pub active: HashMap<TaskId, ActiveTask>,
    pub metrics: PoolMetrics,
}

impl PoolState {
    /// Add a worker, tracking the peak and recording the event.
    pub fn create_worker(&mut self, now: Instant, events: &mut Vec<PoolEvent>) -> WorkerId {
        let worker_id = self.registry.create(now);
        let total_workers = self.registry.len();
        self.metrics.observe_workers(total_workers);
        events.push(PoolEvent::WorkerCreated {
            worker_id,
            total_workers,
        });
        worker_id
    }

    /// Remove an idle worker, recording the event. Busy workers are kept.
    pub fn destroy_worker(&mut self, worker_id: WorkerId, events: &mut Vec<PoolEvent>) -> bool {
        if !self.registry.destroy(worker_id) {
            return false;
        }
        events.push(PoolEvent::WorkerDestroyed {
            worker_id,
            total_workers: self.registry.len(),
        });
        true
    }
}

/// State shared between the pool facade, execution supervisors and the
/// periodic controllers.
pub(crate) struct PoolShared {
    pub id: PoolId,
    pub label: String,
    pub config: PoolConfig,
    pub state: Mutex<PoolState>,
    pub locks: LockManager,
    pub events: EventBus,
    pub spawner: TokioSpawner,
    next_task_id: AtomicU64,
    shutting_down: AtomicBool,
    shutdown_done: watch::Sender<bool>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl PoolShared {
    pub fn emit(&self, events: Vec<PoolEvent>) {
        if !events.is_empty() {
            self.events.emit_all(&self.label, events);
        }
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        for handle in self.background.get_mut().drain(..) {
            handle.abort();
        }
    }
}

/// Dynamic worker pool. Cheap to clone; clones drive the same pool.
#[derive(Clone)]
pub struct TaskPool {
    shared: Arc<PoolShared>,
}

impl fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPool")
            .field("id", &self.shared.id)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl TaskPool {
    /// Create a pool on the current tokio runtime with no event sinks.
    ///
    /// Creates `min_workers` idle workers and starts the autoscaler (when
    /// enabled) and the idle reaper.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidConfig` for an invalid configuration and
    /// `PoolError::Runtime` outside a tokio runtime.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        Self::from_parts(config, None, Vec::new(), TokioSpawner::current()?)
    }

    /// Start building a pool with sinks or an explicit runtime.
    #[must_use]
    pub fn builder() -> crate::builders::TaskPoolBuilder {
        crate::builders::TaskPoolBuilder::new()
    }

    pub(crate) fn from_parts(
        config: PoolConfig,
        name: Option<String>,
        sinks: Vec<Arc<dyn EventSink>>,
        spawner: TokioSpawner,
    ) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let id = PoolId(Uuid::new_v4());
        let (shutdown_done, _) = watch::channel(false);
        let shared = Arc::new(PoolShared {
            id,
            label: name.unwrap_or_else(|| id.to_string()),
            config,
            state: Mutex::new(PoolState {
                queue: InMemoryQueue::new(),
                registry: WorkerRegistry::new(),
                active: HashMap::new(),
                metrics: PoolMetrics::default(),
            }),
            locks: LockManager::new(),
            events: EventBus::new(sinks),
            spawner,
            next_task_id: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
            shutdown_done,
            background: Mutex::new(Vec::new()),
        });

        let mut events = Vec::new();
        {
            let mut state = shared.state.lock();
            let now = Instant::now();
            for _ in 0..shared.config.min_workers {
                state.create_worker(now, &mut events);
            }
        }
        shared.emit(events);

        {
            let mut background = shared.background.lock();
            if shared.config.auto_scale {
                background.push(scaling::spawn_autoscaler(&shared));
            }
            background.push(scaling::spawn_idle_reaper(&shared));
        }

        info!(
            pool = %shared.label,
            min_workers = shared.config.min_workers,
            max_workers = shared.config.max_workers,
            auto_scale = shared.config.auto_scale,
            "task pool initialized"
        );

        Ok(Self { shared })
    }

    /// Pool identifier.
    #[must_use]
    pub fn id(&self) -> PoolId {
        self.shared.id
    }

    /// Name used in logs and events: the builder-supplied name, or the id.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.label
    }

    /// Pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Submit `input` for `unit`. The task is queued and dispatched as soon as
    /// a worker is free; the returned handle resolves exactly once.
    ///
    /// # Errors
    ///
    /// - `PoolError::ShutDown` once shutdown has begun
    /// - `PoolError::InvalidOptions` for a zero timeout or attempt budget
    /// - `PoolError::QueueFull` when the configured queue depth is reached
    pub fn submit<U: WorkUnit>(
        &self,
        unit: U,
        input: U::Input,
        options: SubmitOptions,
    ) -> Result<TaskHandle<U::Output>, PoolError> {
        let shared = &self.shared;
        if shared.shutting_down.load(Ordering::Acquire) {
            return Err(PoolError::ShutDown);
        }

        let timeout = options
            .timeout
            .unwrap_or_else(|| shared.config.task_timeout());
        if timeout.is_zero() {
            return Err(PoolError::InvalidOptions("timeout must be greater than 0".into()));
        }
        let max_attempts = options.max_attempts.unwrap_or(shared.config.max_attempts);
        if max_attempts == 0 {
            return Err(PoolError::InvalidOptions(
                "max_attempts must be greater than 0".into(),
            ));
        }

        let task_id = TaskId(shared.next_task_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        let unit_name = unit.name().to_owned();
        let task = Task::new(
            task_id,
            Box::new(TypedJob::new(unit, input, tx)),
            options.priority,
            timeout,
            max_attempts,
            Instant::now(),
        );

        let mut events = Vec::new();
        {
            let mut state = shared.state.lock();
            // Shutdown flips the flag under this lock, so an accepted task is
            // always visible to its drain.
            if shared.shutting_down.load(Ordering::Acquire) {
                return Err(PoolError::ShutDown);
            }
            if let Some(max_depth) = shared.config.max_queue_depth {
                if state.queue.len() >= max_depth {
                    debug!(pool = %shared.label, %task_id, "rejecting task: queue full");
                    return Err(PoolError::QueueFull(max_depth));
                }
            }
            state.queue.push(task);
            let queue_size = state.queue.len();
            state.metrics.record_queued(queue_size);
            events.push(PoolEvent::TaskQueued {
                task_id,
                priority: options.priority,
                queue_size,
            });
            shared.dispatch_locked(&mut state, &mut events);
        }
        shared.emit(events);

        debug!(pool = %shared.label, %task_id, work_unit = %unit_name, "task submitted");
        Ok(TaskHandle { task_id, rx })
    }

    /// Submit and wait for the outcome.
    ///
    /// # Errors
    ///
    /// Any submission error, or `PoolError::Task` with the terminal error.
    pub async fn execute<U: WorkUnit>(
        &self,
        unit: U,
        input: U::Input,
        options: SubmitOptions,
    ) -> Result<U::Output, PoolError> {
        self.submit(unit, input, options)?.await
    }

    /// The pool's lock manager. Clones may be moved into work units.
    #[must_use]
    pub fn locks(&self) -> &LockManager {
        &self.shared.locks
    }

    /// Acquire a resource lock, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// `LockError::Timeout` if the lock was not granted in time.
    pub async fn acquire_lock(
        &self,
        resource: impl Into<String>,
        timeout: Duration,
    ) -> Result<LockGuard, LockError> {
        self.shared.locks.acquire(resource, timeout).await
    }

    /// Release a lock taken with [`LockGuard::into_raw`].
    pub fn release_lock(&self, resource: &str) {
        self.shared.locks.release(resource);
    }

    /// Snapshot of worker, task and timing statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        let total = state.registry.len();
        let active = state.registry.busy_count();
        PoolStats {
            workers: WorkerStats {
                total,
                active,
                idle: total - active,
                min: self.shared.config.min_workers,
                max: self.shared.config.max_workers,
            },
            tasks: TaskStats {
                queued: state.queue.len(),
                active: state.active.len(),
                completed: state.metrics.tasks_completed,
                failed: state.metrics.tasks_failed,
                retried: state.metrics.tasks_retried,
                total: state.metrics.tasks_queued,
            },
            performance: state.metrics.performance(),
            utilization: utilization(active, total),
        }
    }

    /// Snapshot of every worker slot, in creation order.
    #[must_use]
    pub fn workers(&self) -> Vec<WorkerInfo> {
        let now = Instant::now();
        self.shared
            .state
            .lock()
            .registry
            .iter()
            .map(|worker| worker.info(now))
            .collect()
    }

    /// Whether shutdown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::Acquire)
    }

    /// Stop the periodic controllers, wait until every accepted task has
    /// resolved, then destroy all workers.
    ///
    /// New submissions are rejected from the moment this is called. Safe to
    /// call more than once and from several callers at the same time; every
    /// caller returns once the single drain has finished.
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        let already_started = {
            let _state = shared.state.lock();
            shared.shutting_down.swap(true, Ordering::AcqRel)
        };
        if already_started {
            let mut done = shared.shutdown_done.subscribe();
            let _ = done.wait_for(|finished| *finished).await;
            return;
        }

        info!(pool = %shared.label, "shutting down task pool");
        for handle in shared.background.lock().drain(..) {
            handle.abort();
        }

        let poll = shared.config.shutdown_poll_interval();
        loop {
            let (queued, active) = {
                let state = shared.state.lock();
                (state.queue.len(), state.active.len())
            };
            if queued == 0 && active == 0 {
                break;
            }
            debug!(pool = %shared.label, queued, active, "waiting for tasks to drain");
            tokio::time::sleep(poll).await;
        }

        let mut events = Vec::new();
        {
            let mut state = shared.state.lock();
            let worker_ids: Vec<WorkerId> = state.registry.iter().map(Worker::id).collect();
            for worker_id in worker_ids {
                state.destroy_worker(worker_id, &mut events);
            }
            events.push(PoolEvent::Shutdown {
                tasks_completed: state.metrics.tasks_completed,
                tasks_failed: state.metrics.tasks_failed,
            });
        }
        shared.emit(events);
        shared.shutdown_done.send_replace(true);
    }
}
