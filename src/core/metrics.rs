//! Pool counters and the statistics snapshot served by `TaskPool::stats`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::mean_ms;

/// Monotonic counters and timing sums. Reset only when the pool is rebuilt.
#[derive(Debug, Clone, Default)]
pub(crate) struct PoolMetrics {
    pub tasks_queued: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_retried: u64,
    pub total_wait: Duration,
    pub total_execution: Duration,
    pub peak_queue_size: usize,
    pub peak_worker_count: usize,
}

impl PoolMetrics {
    pub fn record_queued(&mut self, queue_len: usize) {
        self.tasks_queued += 1;
        self.observe_queue(queue_len);
    }

    pub fn observe_queue(&mut self, queue_len: usize) {
        self.peak_queue_size = self.peak_queue_size.max(queue_len);
    }

    pub fn observe_workers(&mut self, worker_count: usize) {
        self.peak_worker_count = self.peak_worker_count.max(worker_count);
    }

    pub fn record_completion(&mut self, wait: Duration, execution: Duration) {
        self.tasks_completed += 1;
        self.total_wait += wait;
        self.total_execution += execution;
    }

    pub fn record_retry(&mut self) {
        self.tasks_retried += 1;
    }

    pub fn record_failure(&mut self) {
        self.tasks_failed += 1;
    }

    pub fn performance(&self) -> PerformanceStats {
        PerformanceStats {
            avg_wait_ms: mean_ms(self.total_wait, self.tasks_completed),
            avg_execution_ms: mean_ms(self.total_execution, self.tasks_completed),
            peak_queue_size: self.peak_queue_size,
            peak_worker_count: self.peak_worker_count,
        }
    }
}

/// Worker counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    /// Workers in the registry.
    pub total: usize,
    /// Workers running a task.
    pub active: usize,
    /// Workers waiting for work.
    pub idle: usize,
    /// Configured minimum.
    pub min: usize,
    /// Configured maximum.
    pub max: usize,
}

/// Task counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    /// Pending tasks, including retries waiting for a worker.
    pub queued: usize,
    /// Tasks running now.
    pub active: usize,
    /// Tasks resolved successfully.
    pub completed: u64,
    /// Tasks failed permanently.
    pub failed: u64,
    /// Attempts requeued after a failure.
    pub retried: u64,
    /// Tasks ever submitted.
    pub total: u64,
}

/// Timing aggregates over successfully completed tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Mean submit-to-dispatch time, in milliseconds.
    pub avg_wait_ms: f64,
    /// Mean dispatch-to-completion time, in milliseconds.
    pub avg_execution_ms: f64,
    /// Largest pending queue observed.
    pub peak_queue_size: usize,
    /// Largest registry observed.
    pub peak_worker_count: usize,
}

/// Point-in-time snapshot of a pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Worker counts.
    pub workers: WorkerStats,
    /// Task counts.
    pub tasks: TaskStats,
    /// Timing aggregates.
    pub performance: PerformanceStats,
    /// Active workers over total workers, in `[0, 1]`; `0` for an empty registry.
    pub utilization: f64,
}

impl PoolStats {
    /// Render the snapshot as JSON.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn utilization(active: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        active as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut metrics = PoolMetrics::default();
        metrics.record_queued(1);
        metrics.record_queued(4);
        metrics.record_queued(2);
        metrics.observe_workers(3);
        metrics.observe_workers(1);
        metrics.record_completion(Duration::from_millis(10), Duration::from_millis(40));
        metrics.record_completion(Duration::from_millis(30), Duration::from_millis(60));
        metrics.record_failure();
        metrics.record_retry();

        assert_eq!(metrics.tasks_queued, 3);
        assert_eq!(metrics.tasks_completed, 2);
        assert_eq!(metrics.tasks_failed, 1);
        assert_eq!(metrics.tasks_retried, 1);

        let perf = metrics.performance();
        assert_eq!(perf.peak_queue_size, 4);
        assert_eq!(perf.peak_worker_count, 3);
        assert!((perf.avg_wait_ms - 20.0).abs() < 1e-9);
        assert!((perf.avg_execution_ms - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_utilization() {
        assert!(utilization(0, 0).abs() < f64::EPSILON);
        assert!((utilization(1, 4) - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_serialize() {
        let json = PoolStats::default().to_json().unwrap();
        assert!(json.contains("\"workers\""));
        assert!(json.contains("\"peak_queue_size\":0"));
    }
}
