//! Error types for pool, task and lock operations.

use std::time::Duration;

use thiserror::Error;

use super::TaskId;

/// Terminal failure of a task, reported once its attempt budget is spent.
///
/// Intermediate failures are retried transparently and never reach the caller;
/// every variant carries the number of attempts actually made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The watchdog fired before the work unit finished.
    #[error("{task_id} timed out after {attempts} attempt(s) (timeout {timeout:?})")]
    Timeout {
        /// Task identifier.
        task_id: TaskId,
        /// Attempts made.
        attempts: u32,
        /// Per-attempt timeout.
        timeout: Duration,
    },
    /// The work unit returned an error.
    #[error("{task_id} failed after {attempts} attempt(s): {message}")]
    Execution {
        /// Task identifier.
        task_id: TaskId,
        /// Attempts made.
        attempts: u32,
        /// Rendered error chain of the last attempt.
        message: String,
    },
    /// The execution context ended without reporting (panic or cancellation).
    #[error("{task_id} terminated abnormally after {attempts} attempt(s): {message}")]
    AbnormalTermination {
        /// Task identifier.
        task_id: TaskId,
        /// Attempts made.
        attempts: u32,
        /// Description of the termination.
        message: String,
    },
}

impl TaskError {
    /// Task the error belongs to.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        match self {
            Self::Timeout { task_id, .. }
            | Self::Execution { task_id, .. }
            | Self::AbnormalTermination { task_id, .. } => *task_id,
        }
    }

    /// Attempts made before giving up.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Timeout { attempts, .. }
            | Self::Execution { attempts, .. }
            | Self::AbnormalTermination { attempts, .. } => *attempts,
        }
    }
}

/// Errors produced by the lock manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The waiter was not granted the lock within its budget.
    #[error("lock timeout for resource {resource} after {waited:?}")]
    Timeout {
        /// Resource identifier.
        resource: String,
        /// Wait budget that elapsed.
        waited: Duration,
    },
}

/// Errors surfaced by the pool facade.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool is shutting down and accepts no new work.
    #[error("pool is shutting down")]
    ShutDown,
    /// The pending queue reached its configured depth.
    #[error("task queue is full (max depth {0})")]
    QueueFull(usize),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Submission options were rejected.
    #[error("invalid task options: {0}")]
    InvalidOptions(String),
    /// No tokio runtime was available to host the pool.
    #[error("runtime unavailable: {0}")]
    Runtime(String),
    /// A task failed permanently.
    #[error(transparent)]
    Task(#[from] TaskError),
    /// A lock acquisition failed.
    #[error(transparent)]
    Lock(#[from] LockError),
    /// Internal error (result channel dropped, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
