//! Task model: one unit of deferred work and its lifecycle bookkeeping.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::executor::Job;

/// Unique identifier of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Dispatch priority. Higher values are more urgent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    /// Background work.
    pub const LOW: Self = Self(-10);
    /// Default priority.
    pub const NORMAL: Self = Self(0);
    /// Interactive work (e.g. login password verification).
    pub const HIGH: Self = Self(10);
    /// Work that must jump every queue.
    pub const CRITICAL: Self = Self(100);
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle stage of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the pending queue (fresh or retry-requeued).
    Queued,
    /// Executing on a worker.
    Running,
    /// Finished successfully.
    Completed,
    /// Failed permanently.
    Failed,
}

/// A unit of deferred work owned by the coordinator.
///
/// Attempts never exceed `max_attempts`, and `completed_at` is written at
/// most once; after that the task leaves the active set and is dropped.
pub struct Task {
    id: TaskId,
    priority: Priority,
    timeout: Duration,
    attempts: u32,
    max_attempts: u32,
    status: TaskStatus,
    created_at: Instant,
    started_at: Option<Instant>,
    completed_at: Option<Instant>,
    pub(crate) job: Box<dyn Job>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        job: Box<dyn Job>,
        priority: Priority,
        timeout: Duration,
        max_attempts: u32,
        created_at: Instant,
    ) -> Self {
        Self {
            id,
            priority,
            timeout,
            attempts: 0,
            max_attempts,
            status: TaskStatus::Queued,
            created_at,
            started_at: None,
            completed_at: None,
            job,
        }
    }

    /// Task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Dispatch priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Per-attempt timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Attempts started so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Attempt budget.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Current lifecycle stage.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Name of the work unit this task runs.
    #[must_use]
    pub fn work_unit(&self) -> &str {
        self.job.unit_name()
    }

    /// Whether another attempt is allowed after a failure.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        self.completed_at.is_none() && self.attempts < self.max_attempts
    }

    /// Whether the task reached a terminal state.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Time spent waiting between submission and the latest dispatch, or up
    /// to `now` if the task never started.
    #[must_use]
    pub fn wait_time(&self, now: Instant) -> Duration {
        self.started_at
            .unwrap_or(now)
            .saturating_duration_since(self.created_at)
    }

    /// Duration of the final attempt, once the task has finished.
    #[must_use]
    pub fn execution_time(&self) -> Option<Duration> {
        let started = self.started_at?;
        self.completed_at
            .map(|completed| completed.saturating_duration_since(started))
    }

    /// Start a new attempt. Returns the attempt number.
    pub(crate) fn begin_attempt(&mut self, now: Instant) -> u32 {
        debug_assert!(self.attempts < self.max_attempts);
        self.attempts += 1;
        self.started_at = Some(now);
        self.status = TaskStatus::Running;
        self.attempts
    }

    /// Put the task back in line after a failed attempt.
    pub(crate) fn requeue(&mut self) {
        self.status = TaskStatus::Queued;
    }

    /// Mark the task terminal. Returns `false` if it already was.
    pub(crate) fn finish(&mut self, now: Instant, succeeded: bool) -> bool {
        if self.completed_at.is_some() {
            return false;
        }
        self.completed_at = Some(now);
        self.status = if succeeded {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        true
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("work_unit", &self.job.unit_name())
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .field("attempts", &self.attempts)
            .field("max_attempts", &self.max_attempts)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::executor::{AttemptFuture, Job};
    use crate::core::TaskError;

    /// Job that does nothing; for exercising bookkeeping only.
    pub(crate) struct NoopJob;

    impl Job for NoopJob {
        fn unit_name(&self) -> &str {
            "noop"
        }

        fn attempt(&self) -> AttemptFuture {
            Box::pin(async { Ok(Box::new(|| {}) as crate::core::executor::Delivery) })
        }

        fn reject(&self, _error: TaskError) {}
    }

    pub(crate) fn make_task(id: u64, priority: i32) -> Task {
        Task::new(
            TaskId(id),
            Box::new(NoopJob),
            Priority(priority),
            Duration::from_secs(1),
            3,
            Instant::now(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_lifecycle() {
        let mut task = make_task(1, 0);
        assert_eq!(task.status(), TaskStatus::Queued);
        assert!(task.can_retry());

        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(task.begin_attempt(Instant::now()), 1);
        assert_eq!(task.wait_time(Instant::now()), Duration::from_millis(20));
        task.requeue();
        task.begin_attempt(Instant::now());
        task.begin_attempt(Instant::now());
        assert_eq!(task.attempts(), 3);
        assert!(!task.can_retry());

        tokio::time::advance(Duration::from_millis(5)).await;
        assert!(task.finish(Instant::now(), false));
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(task.execution_time(), Some(Duration::from_millis(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_is_idempotent() {
        let mut task = make_task(2, 0);
        task.begin_attempt(Instant::now());
        assert!(task.finish(Instant::now(), true));
        assert!(!task.finish(Instant::now(), false));
        assert_eq!(task.status(), TaskStatus::Completed);
        assert!(task.is_finished());
        assert!(!task.can_retry());
    }
}
