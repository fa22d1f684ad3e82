//! Tests for error types

use std::time::Duration;

use prometheus_task_pool::core::{LockError, PoolError, TaskError, TaskId};

#[test]
fn test_timeout_error() {
    let err = TaskError::Timeout {
        task_id: TaskId(3),
        attempts: 3,
        timeout: Duration::from_millis(50),
    };
    assert_eq!(
        format!("{err}"),
        "task-3 timed out after 3 attempt(s) (timeout 50ms)"
    );
    assert_eq!(err.attempts(), 3);
    assert_eq!(err.task_id(), TaskId(3));
}

#[test]
fn test_execution_error() {
    let err = TaskError::Execution {
        task_id: TaskId(1),
        attempts: 2,
        message: "connection refused".into(),
    };
    assert_eq!(
        format!("{err}"),
        "task-1 failed after 2 attempt(s): connection refused"
    );
}

#[test]
fn test_lock_timeout_error() {
    let err = LockError::Timeout {
        resource: "R".into(),
        waited: Duration::from_millis(100),
    };
    assert_eq!(format!("{err}"), "lock timeout for resource R after 100ms");
}

#[test]
fn test_pool_error_is_transparent_over_task_and_lock() {
    let task: PoolError = TaskError::AbnormalTermination {
        task_id: TaskId(9),
        attempts: 1,
        message: "execution context panicked".into(),
    }
    .into();
    assert_eq!(
        format!("{task}"),
        "task-9 terminated abnormally after 1 attempt(s): execution context panicked"
    );

    let lock: PoolError = LockError::Timeout {
        resource: "ledger".into(),
        waited: Duration::from_secs(1),
    }
    .into();
    assert!(matches!(lock, PoolError::Lock(_)));
}

#[test]
fn test_admission_errors() {
    assert_eq!(format!("{}", PoolError::ShutDown), "pool is shutting down");
    assert_eq!(
        format!("{}", PoolError::QueueFull(64)),
        "task queue is full (max depth 64)"
    );
}
