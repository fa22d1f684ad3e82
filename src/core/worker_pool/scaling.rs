//! Periodic controllers: the autoscaler grows the registry under queue
//! pressure, the idle reaper shrinks it back towards `min_workers`.
//!
//! Both hold only a weak reference to the pool and stop once it is gone.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::trace;

use crate::core::events::PoolEvent;
use crate::core::registry::WorkerId;

use super::{PoolShared, PoolState};

/// Workers to add when `pending` tasks wait on `total` workers.
///
/// Grows by half the backlog, rounded up, only while the backlog outnumbers
/// the registry, and never past `max`.
pub(crate) fn scale_up_count(pending: usize, total: usize, max: usize) -> usize {
    if pending > total && total < max {
        pending.div_ceil(2).min(max - total)
    } else {
        0
    }
}

/// Workers to add when a task is waiting, no worker is idle and `total`
/// is still below `max`.
///
/// At least one, or the autoscaler's step when that is larger, capped at
/// `max`.
pub(crate) fn on_demand_count(pending: usize, total: usize, max: usize) -> usize {
    if total >= max {
        return 0;
    }
    scale_up_count(pending, total, max).max(1).min(max - total)
}

/// Expired idle workers that may be reaped without dropping below `min`.
pub(crate) fn reap_candidates(expired: Vec<WorkerId>, total: usize, min: usize) -> Vec<WorkerId> {
    let excess = total.saturating_sub(min);
    expired.into_iter().take(excess).collect()
}

impl PoolShared {
    /// Apply the growth rule to the current backlog. Returns workers added.
    pub(super) fn grow_locked(&self, state: &mut PoolState, events: &mut Vec<PoolEvent>) -> usize {
        let added = scale_up_count(
            state.queue.len(),
            state.registry.len(),
            self.config.max_workers,
        );
        self.add_workers_locked(state, added, events)
    }

    /// Grow for a task that found every worker busy. Returns workers added.
    pub(super) fn grow_on_demand_locked(
        &self,
        state: &mut PoolState,
        events: &mut Vec<PoolEvent>,
    ) -> usize {
        let added = on_demand_count(
            state.queue.len(),
            state.registry.len(),
            self.config.max_workers,
        );
        self.add_workers_locked(state, added, events)
    }

    fn add_workers_locked(
        &self,
        state: &mut PoolState,
        added: usize,
        events: &mut Vec<PoolEvent>,
    ) -> usize {
        if added == 0 {
            return 0;
        }
        let now = Instant::now();
        for _ in 0..added {
            state.create_worker(now, events);
        }
        events.push(PoolEvent::ScaledUp {
            added,
            total: state.registry.len(),
            queue_size: state.queue.len(),
        });
        added
    }

    /// One autoscaler tick.
    pub(super) fn autoscale_cycle(self: &Arc<Self>) -> usize {
        let mut events = Vec::new();
        let added = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let added = self.grow_locked(state, &mut events);
            if added > 0 {
                self.dispatch_locked(state, &mut events);
            }
            added
        };
        self.emit(events);
        added
    }

    /// One idle-reaper tick.
    pub(super) fn reap_cycle(&self) -> usize {
        let mut events = Vec::new();
        let removed = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let expired = state
                .registry
                .expired_idle(Instant::now(), self.config.idle_timeout());
            let candidates =
                reap_candidates(expired, state.registry.len(), self.config.min_workers);
            let mut removed = 0;
            for worker_id in candidates {
                if state.destroy_worker(worker_id, &mut events) {
                    removed += 1;
                }
            }
            if removed > 0 {
                events.push(PoolEvent::ScaledDown {
                    removed,
                    total: state.registry.len(),
                });
            }
            removed
        };
        self.emit(events);
        removed
    }
}

/// Start the autoscaler loop.
pub(super) fn spawn_autoscaler(shared: &Arc<PoolShared>) -> JoinHandle<()> {
    let period = shared.config.scale_interval();
    spawn_periodic(shared, period, "autoscaler", |shared| {
        shared.autoscale_cycle();
    })
}

/// Start the idle reaper loop.
pub(super) fn spawn_idle_reaper(shared: &Arc<PoolShared>) -> JoinHandle<()> {
    let period = shared.config.idle_check_interval();
    spawn_periodic(shared, period, "idle reaper", |shared| {
        shared.reap_cycle();
    })
}

fn spawn_periodic<F>(
    shared: &Arc<PoolShared>,
    period: Duration,
    name: &'static str,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn(&Arc<PoolShared>) + Send + 'static,
{
    let weak: Weak<PoolShared> = Arc::downgrade(shared);
    shared.spawner.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(shared) = weak.upgrade() else {
                break;
            };
            trace!(pool = %shared.label, controller = name, "tick");
            tick(&shared);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_up_half_backlog_rounded_up() {
        assert_eq!(scale_up_count(5, 2, 10), 3);
        assert_eq!(scale_up_count(6, 2, 10), 3);
        assert_eq!(scale_up_count(1, 0, 10), 1);
    }

    #[test]
    fn test_scale_up_capped_at_max() {
        assert_eq!(scale_up_count(20, 6, 8), 2);
        assert_eq!(scale_up_count(20, 8, 8), 0);
    }

    #[test]
    fn test_no_growth_without_pressure() {
        assert_eq!(scale_up_count(2, 2, 8), 0);
        assert_eq!(scale_up_count(0, 0, 8), 0);
    }

    #[test]
    fn test_on_demand_adds_at_least_one_below_max() {
        assert_eq!(on_demand_count(1, 1, 4), 1);
        assert_eq!(on_demand_count(2, 2, 4), 1);
        assert_eq!(on_demand_count(9, 1, 4), 3);
        assert_eq!(on_demand_count(7, 1, 10), 4);
        assert_eq!(on_demand_count(3, 4, 4), 0);
    }

    #[test]
    fn test_reap_never_below_min() {
        let expired = vec![WorkerId(1), WorkerId(2), WorkerId(3)];
        assert_eq!(
            reap_candidates(expired.clone(), 4, 2),
            vec![WorkerId(1), WorkerId(2)]
        );
        assert!(reap_candidates(expired.clone(), 2, 2).is_empty());
        assert_eq!(reap_candidates(expired, 3, 0).len(), 3);
    }
}
