//! Benchmarks for the task pool.
//!
//! Benchmarks cover:
//! - Submit-to-resolve throughput with and without queueing
//! - Priority scheduling under a mixed workload
//! - Lock acquire/release, uncontended and with FIFO hand-off

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::time::Duration;

use prometheus_task_pool::config::{PoolConfig, SubmitOptions};
use prometheus_task_pool::core::{LockManager, Priority, TaskPool, WorkUnit};

use async_trait::async_trait;
use tokio::runtime::Runtime;

// ============================================================================
// Work Unit
// ============================================================================

#[derive(Clone)]
struct Checksum;

#[async_trait]
impl WorkUnit for Checksum {
    type Input = u64;
    type Output = u64;

    fn name(&self) -> &str {
        "checksum"
    }

    async fn run(&self, input: u64) -> anyhow::Result<u64> {
        Ok((0..64).fold(input, |acc, n| acc.rotate_left(5) ^ n))
    }
}

fn bench_config(workers: usize) -> PoolConfig {
    PoolConfig::new()
        .with_min_workers(workers)
        .with_max_workers(workers)
        .with_auto_scale(false)
}

// ============================================================================
// Pool Benchmarks
// ============================================================================

fn bench_pool_submit_and_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_submit_and_resolve");

    for task_count in [50u64, 200, 1_000] {
        group.throughput(Throughput::Elements(task_count));
        group.bench_with_input(
            BenchmarkId::from_parameter(task_count),
            &task_count,
            |b, &task_count| {
                b.to_async(Runtime::new().unwrap()).iter(|| async move {
                    // Few workers to force queueing.
                    let pool = TaskPool::new(bench_config(4)).unwrap();
                    let handles: Vec<_> = (0..task_count)
                        .map(|i| pool.submit(Checksum, i, SubmitOptions::new()).unwrap())
                        .collect();
                    for handle in handles {
                        black_box(handle.await.unwrap());
                    }
                    pool.shutdown().await;
                });
            },
        );
    }
    group.finish();
}

fn bench_pool_mixed_priorities(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_mixed_priorities");

    group.bench_function("mixed_priority_scheduling", |b| {
        b.to_async(Runtime::new().unwrap()).iter(|| async {
            let pool = TaskPool::new(bench_config(2)).unwrap();
            let handles: Vec<_> = (0..200u64)
                .map(|i| {
                    let priority = match i % 4 {
                        0 => Priority::CRITICAL,
                        1 => Priority::HIGH,
                        2 => Priority::NORMAL,
                        _ => Priority::LOW,
                    };
                    pool.submit(Checksum, i, SubmitOptions::new().with_priority(priority))
                        .unwrap()
                })
                .collect();
            for handle in handles {
                black_box(handle.await.unwrap());
            }
            pool.shutdown().await;
        });
    });
    group.finish();
}

// ============================================================================
// Lock Benchmarks
// ============================================================================

fn bench_lock_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_uncontended");

    group.bench_function("acquire_release", |b| {
        let locks = LockManager::new();
        b.to_async(Runtime::new().unwrap()).iter(|| {
            let locks = locks.clone();
            async move {
                let guard = locks
                    .acquire("bench-resource", Duration::from_secs(1))
                    .await
                    .unwrap();
                black_box(guard.resource().len());
                guard.release();
            }
        });
    });
    group.finish();
}

fn bench_lock_handoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_handoff");

    for contenders in [4usize, 16, 64] {
        group.throughput(Throughput::Elements(contenders as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(contenders),
            &contenders,
            |b, &contenders| {
                b.to_async(Runtime::new().unwrap()).iter(|| async move {
                    let locks = LockManager::new();
                    let tasks: Vec<_> = (0..contenders)
                        .map(|_| {
                            let locks = locks.clone();
                            tokio::spawn(async move {
                                locks
                                    .with_lock("shared", Duration::from_secs(5), async {
                                        tokio::task::yield_now().await;
                                    })
                                    .await
                                    .unwrap();
                            })
                        })
                        .collect();
                    for task in tasks {
                        task.await.unwrap();
                    }
                });
            },
        );
    }
    group.finish();
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(
    pool_benches,
    bench_pool_submit_and_resolve,
    bench_pool_mixed_priorities
);

criterion_group!(lock_benches, bench_lock_uncontended, bench_lock_handoff);

criterion_main!(pool_benches, lock_benches);
