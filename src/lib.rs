//! # Prometheus Task Pool
//!
//! A dynamic worker pool for offloading CPU-heavy work units from an async
//! service, with priority scheduling, transparent retries, watchdog timeouts
//! and per-pool FIFO resource locks.
//!
//! ## Core Problem Solved
//!
//! Services that hash passwords, render reports or crunch numbers need that
//! work kept off the request path without losing control of it:
//!
//! - **Bounded concurrency**: the worker registry stays between a minimum and
//!   a maximum, growing under queue pressure and shrinking when idle
//! - **Urgent work first**: higher-priority tasks jump the queue, equal
//!   priorities run in submission order
//! - **Failure isolation**: every attempt runs in a fresh execution context; a
//!   hung or crashing attempt is aborted and retried without the caller
//!   noticing, until the attempt budget runs out
//! - **Serialized side effects**: tasks touching the same resource can queue
//!   on a named lock with a bounded wait
//!
//! ## Key Features
//!
//! - **Priority queue with retry preference**: a retried task goes back to the
//!   front of its priority tier
//! - **Autoscaler**: grows by half the backlog per cycle, never past the max
//! - **Idle reaper**: reclaims workers idle past a timeout, never below the min
//! - **Lock manager**: FIFO hand-off on release, so the resource is never
//!   briefly free while someone waits for it
//! - **Events and stats**: lifecycle notifications for sinks, plus a stats
//!   snapshot serializable to JSON
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use prometheus_task_pool::config::{PoolConfig, SubmitOptions};
//! use prometheus_task_pool::core::{BlockingWorkUnit, InMemoryEventSink, Priority, TaskPool};
//!
//! let events = InMemoryEventSink::new(1_000);
//! let pool = TaskPool::builder()
//!     .config(PoolConfig::new().with_min_workers(2).with_max_workers(8))
//!     .name("report-renderer")
//!     .with_event_sink(events.clone())
//!     .build()?;
//!
//! let render = BlockingWorkUnit::new("render-report", |id: u64| render_report(id));
//! let report = pool
//!     .execute(render, 42, SubmitOptions::new().with_priority(Priority::HIGH))
//!     .await?;
//!
//! // Serialize writes to one customer's ledger across tasks.
//! let guard = pool.acquire_lock("ledger:42", Duration::from_secs(5)).await?;
//! drop(guard);
//!
//! println!("{}", pool.stats().to_json()?);
//! pool.shutdown().await;
//! ```
//!
//! For complete examples, see `tests/worker_pool_test.rs` and
//! `tests/lock_manager_test.rs`.

#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Tasks, workers, locks, events and the pool facade.
pub mod core;
/// Pool and submission configuration.
pub mod config;
/// Builders to construct pools from configuration.
pub mod builders;
/// Infrastructure adapters: the pending-task queue.
pub mod infra;
/// Runtime adapters for spawning execution contexts.
pub mod runtime;
/// Shared utilities.
pub mod util;
