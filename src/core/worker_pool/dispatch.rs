//! Dispatch loop, attempt supervision and retry policy.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::debug;

use crate::core::events::PoolEvent;
use crate::core::executor::Delivery;
use crate::core::registry::WorkerId;
use crate::core::{Task, TaskError, TaskId};
use crate::util::duration_ms;

use super::{ActiveTask, PoolShared, PoolState};

/// Why an attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Failure {
    /// Watchdog expiry.
    Timeout,
    /// The work unit returned an error.
    Execution(String),
    /// The execution context panicked or was cancelled.
    AbnormalTermination(String),
}

impl Failure {
    fn describe(&self, timeout: Duration) -> String {
        match self {
            Self::Timeout => format!("timed out after {timeout:?}"),
            Self::Execution(message) | Self::AbnormalTermination(message) => message.clone(),
        }
    }

    fn into_task_error(self, task: &Task) -> TaskError {
        let task_id = task.id();
        let attempts = task.attempts();
        match self {
            Self::Timeout => TaskError::Timeout {
                task_id,
                attempts,
                timeout: task.timeout(),
            },
            Self::Execution(message) => TaskError::Execution {
                task_id,
                attempts,
                message,
            },
            Self::AbnormalTermination(message) => TaskError::AbnormalTermination {
                task_id,
                attempts,
                message,
            },
        }
    }
}

/// Result of one supervised attempt.
pub(super) enum AttemptOutcome {
    Succeeded(Delivery),
    Failed(Failure),
}

impl PoolShared {
    /// Match pending tasks to idle workers until one side runs out.
    ///
    /// When every worker is busy and the registry is below its maximum, at
    /// least one worker is added on the spot; at the maximum, dispatch stops
    /// until a worker frees up.
    pub(super) fn dispatch_locked(
        self: &Arc<Self>,
        state: &mut PoolState,
        events: &mut Vec<PoolEvent>,
    ) {
        while !state.queue.is_empty() {
            let Some(worker_id) = state.registry.find_available() else {
                if self.config.auto_scale && self.grow_on_demand_locked(state, events) > 0 {
                    continue;
                }
                debug!(
                    pool = %self.label,
                    queued = state.queue.len(),
                    workers = state.registry.len(),
                    "no idle worker, tasks stay queued"
                );
                break;
            };
            let Some(task) = state.queue.pop() else {
                break;
            };
            self.start_attempt(state, task, worker_id, events);
        }
    }

    /// Run one attempt of `task` on `worker_id` in a fresh execution context
    /// under a watchdog.
    fn start_attempt(
        self: &Arc<Self>,
        state: &mut PoolState,
        mut task: Task,
        worker_id: WorkerId,
        events: &mut Vec<PoolEvent>,
    ) {
        let now = Instant::now();
        let attempt = task.begin_attempt(now);
        let task_id = task.id();
        let timeout = task.timeout();

        let execution = self.spawner.spawn(task.job.attempt());
        let assigned = state
            .registry
            .assign(worker_id, task_id, execution.abort_handle());
        debug_assert!(assigned, "dispatch picked a busy worker");

        events.push(PoolEvent::TaskStarted {
            task_id,
            worker_id,
            attempt,
            wait_ms: duration_ms(task.wait_time(now)),
        });
        state.active.insert(
            task_id,
            ActiveTask {
                task,
                worker: worker_id,
            },
        );

        let shared = Arc::clone(self);
        self.spawner.spawn(async move {
            let outcome = supervise(execution, timeout).await;
            shared.finish_attempt(task_id, attempt, outcome);
        });
    }

    /// Apply an attempt's outcome: resolve, retry or fail the task, free the
    /// worker, and dispatch again.
    ///
    /// Signals for a task that already finished, or for an attempt that is
    /// no longer current, are ignored. Handles are resolved after the state
    /// lock is released.
    pub(super) fn finish_attempt(
        self: &Arc<Self>,
        task_id: TaskId,
        attempt: u32,
        outcome: AttemptOutcome,
    ) {
        let mut events = Vec::new();
        let mut replies: Vec<Delivery> = Vec::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let is_current = state.active.get(&task_id).is_some_and(|active| {
                active.task.attempts() == attempt && !active.task.is_finished()
            });
            if !is_current {
                debug!(
                    pool = %self.label,
                    %task_id,
                    attempt,
                    "ignoring stale completion signal"
                );
                return;
            }
            let Some(ActiveTask { mut task, worker }) = state.active.remove(&task_id) else {
                return;
            };

            let now = Instant::now();
            match outcome {
                AttemptOutcome::Succeeded(delivery) => {
                    state.registry.release(worker, now, true);
                    task.finish(now, true);
                    let execution = task.execution_time().unwrap_or_default();
                    state
                        .metrics
                        .record_completion(task.wait_time(now), execution);
                    events.push(PoolEvent::TaskCompleted {
                        task_id,
                        worker_id: worker,
                        duration_ms: duration_ms(execution),
                    });
                    replies.push(Box::new(move || {
                        delivery();
                        drop(task);
                    }));
                }
                AttemptOutcome::Failed(failure) => {
                    state.registry.release(worker, now, false);
                    if task.can_retry() {
                        events.push(PoolEvent::TaskRetrying {
                            task_id,
                            worker_id: worker,
                            attempt,
                            max_attempts: task.max_attempts(),
                            error: failure.describe(task.timeout()),
                        });
                        task.requeue();
                        state.metrics.record_retry();
                        state.queue.push_front(task);
                        state.metrics.observe_queue(state.queue.len());
                    } else {
                        task.finish(now, false);
                        let error = failure.into_task_error(&task);
                        state.metrics.record_failure();
                        events.push(PoolEvent::TaskFailed {
                            task_id,
                            worker_id: worker,
                            error: error.to_string(),
                            attempts: task.attempts(),
                        });
                        replies.push(Box::new(move || task.job.reject(error)));
                    }
                }
            }

            self.dispatch_locked(state, &mut events);
        }
        self.emit(events);
        for reply in replies {
            reply();
        }
    }
}

/// Wait for an execution context to report, enforcing `timeout`. On expiry
/// the context is aborted.
async fn supervise(
    execution: JoinHandle<anyhow::Result<Delivery>>,
    timeout: Duration,
) -> AttemptOutcome {
    let abort = execution.abort_handle();
    match tokio::time::timeout(timeout, execution).await {
        Ok(Ok(Ok(delivery))) => AttemptOutcome::Succeeded(delivery),
        Ok(Ok(Err(err))) => AttemptOutcome::Failed(Failure::Execution(format!("{err:#}"))),
        Ok(Err(err)) => {
            AttemptOutcome::Failed(Failure::AbnormalTermination(describe_join_error(err)))
        }
        Err(_) => {
            abort.abort();
            AttemptOutcome::Failed(Failure::Timeout)
        }
    }
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_cancelled() {
        return "execution context was cancelled".into();
    }
    match err.try_into_panic() {
        Ok(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned());
            match message {
                Some(message) => format!("execution context panicked: {message}"),
                None => "execution context panicked".into(),
            }
        }
        Err(err) => err.to_string(),
    }
}
