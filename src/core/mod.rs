//! Task scheduling, worker bookkeeping, resource locks and pool lifecycle.

pub mod error;
pub mod events;
pub mod executor;
pub mod lock_manager;
pub mod metrics;
pub mod registry;
pub mod task;
pub mod worker_pool;

pub use error::{AppResult, LockError, PoolError, TaskError};
pub use events::{EventSink, InMemoryEventSink, PoolEvent, TracingEventSink};
pub use executor::{BlockingWorkUnit, WorkUnit};
pub use lock_manager::{LockGuard, LockManager};
pub use metrics::{PerformanceStats, PoolStats, TaskStats, WorkerStats};
pub use registry::{Worker, WorkerId, WorkerInfo, WorkerRegistry};
pub use task::{Priority, Task, TaskId, TaskStatus};
pub use worker_pool::{PoolId, TaskHandle, TaskPool};
