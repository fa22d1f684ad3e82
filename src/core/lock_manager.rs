//! FIFO mutual exclusion keyed by resource identifier.
//!
//! Each resource has at most one holder. Contenders queue in arrival order and
//! every wait is bounded by the caller's timeout. On release, ownership moves
//! straight to the oldest waiter, so the resource never appears free while
//! someone is queued for it.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use prometheus_task_pool::core::LockManager;
//!
//! let locks = LockManager::new();
//! let guard = locks.acquire("session:device-42", Duration::from_secs(10)).await?;
//! // ... update the per-device session record ...
//! drop(guard); // or guard.release()
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use super::LockError;

struct Waiter {
    id: u64,
    grant: oneshot::Sender<()>,
}

#[derive(Default)]
struct LockEntry {
    held: bool,
    waiters: VecDeque<Waiter>,
}

#[derive(Default)]
struct LockTable {
    entries: Mutex<HashMap<String, LockEntry>>,
    next_waiter: AtomicU64,
}

/// Instance-owned lock table. Clones share the same table.
#[derive(Clone, Default)]
pub struct LockManager {
    table: Arc<LockTable>,
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("resources", &self.resource_count())
            .finish()
    }
}

impl LockManager {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `resource`, waiting at most `timeout` behind earlier callers.
    ///
    /// The returned guard releases on drop. Dropping this future while it
    /// waits leaves the queue cleanly.
    ///
    /// # Errors
    ///
    /// [`LockError::Timeout`] if the lock was not granted in time. Lock
    /// timeouts are never retried here.
    pub async fn acquire(
        &self,
        resource: impl Into<String>,
        timeout: Duration,
    ) -> Result<LockGuard, LockError> {
        let resource = resource.into();
        let (waiter_id, grant) = {
            let mut entries = self.table.entries.lock();
            let entry = entries.entry(resource.clone()).or_default();
            if !entry.held {
                entry.held = true;
                trace!(resource = %resource, "lock granted immediately");
                return Ok(LockGuard::new(self.clone(), resource));
            }
            let waiter_id = self.table.next_waiter.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();
            entry.waiters.push_back(Waiter { id: waiter_id, grant: tx });
            debug!(
                resource = %resource,
                waiters = entry.waiters.len(),
                "lock held, queued waiter"
            );
            (waiter_id, rx)
        };

        let mut wait = PendingWait {
            manager: self,
            resource: &resource,
            waiter_id,
            grant,
            settled: false,
        };

        let outcome = tokio::time::timeout(timeout, &mut wait.grant).await;
        let granted = match outcome {
            Ok(Ok(())) => true,
            // Sender gone without a grant: fall through to the cancel path.
            Ok(Err(_)) | Err(_) => wait.cancel(),
        };
        wait.settled = true;
        drop(wait);

        if granted {
            trace!(resource = %resource, "lock granted to waiter");
            Ok(LockGuard::new(self.clone(), resource))
        } else {
            warn!(resource = %resource, ?timeout, "lock wait timed out");
            Err(LockError::Timeout {
                resource,
                waited: timeout,
            })
        }
    }

    /// Release `resource`. If waiters exist, ownership passes to the oldest
    /// one and the resource stays held; otherwise it becomes free and its
    /// entry is dropped. Releasing a free or unknown resource is a no-op.
    ///
    /// Pairs with [`LockGuard::into_raw`]; guards call this on drop.
    pub fn release(&self, resource: &str) {
        let mut entries = self.table.entries.lock();
        let Some(entry) = entries.get_mut(resource) else {
            return;
        };
        if !entry.held {
            return;
        }
        while let Some(waiter) = entry.waiters.pop_front() {
            if waiter.grant.send(()).is_ok() {
                trace!(resource, waiter = waiter.id, "lock ownership transferred");
                return;
            }
            // Waiter gave up between timing out and removing itself.
        }
        entry.held = false;
        entries.remove(resource);
        trace!(resource, "lock released");
    }

    /// Run `work` while holding `resource`, releasing on every exit path.
    ///
    /// # Errors
    ///
    /// [`LockError::Timeout`] if the lock was not granted in time.
    pub async fn with_lock<F, T>(
        &self,
        resource: impl Into<String>,
        timeout: Duration,
        work: F,
    ) -> Result<T, LockError>
    where
        F: Future<Output = T>,
    {
        let guard = self.acquire(resource, timeout).await?;
        let output = work.await;
        guard.release();
        Ok(output)
    }

    /// Whether `resource` currently has a holder.
    #[must_use]
    pub fn is_locked(&self, resource: &str) -> bool {
        self.table
            .entries
            .lock()
            .get(resource)
            .is_some_and(|entry| entry.held)
    }

    /// Callers queued behind the holder of `resource`.
    #[must_use]
    pub fn waiter_count(&self, resource: &str) -> usize {
        self.table
            .entries
            .lock()
            .get(resource)
            .map_or(0, |entry| entry.waiters.len())
    }

    /// Resources with a live entry (held or contended).
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.table.entries.lock().len()
    }

    /// Remove a waiter that stopped waiting. Returns `true` if the grant had
    /// already been handed over, in which case the caller owns the lock.
    fn withdraw(&self, resource: &str, waiter_id: u64, grant: &mut oneshot::Receiver<()>) -> bool {
        {
            let mut entries = self.table.entries.lock();
            if let Some(entry) = entries.get_mut(resource) {
                if let Some(pos) = entry.waiters.iter().position(|w| w.id == waiter_id) {
                    entry.waiters.remove(pos);
                    return false;
                }
            }
        }
        // Not queued any more: release() already sent the grant.
        grant.try_recv().is_ok()
    }
}

/// A queued acquisition. If the acquire future is dropped mid-wait, the
/// waiter leaves the queue, or passes on a grant it already received.
struct PendingWait<'a> {
    manager: &'a LockManager,
    resource: &'a str,
    waiter_id: u64,
    grant: oneshot::Receiver<()>,
    settled: bool,
}

impl PendingWait<'_> {
    fn cancel(&mut self) -> bool {
        self.manager
            .withdraw(self.resource, self.waiter_id, &mut self.grant)
    }
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        if !self.settled && self.cancel() {
            self.manager.release(self.resource);
        }
    }
}

/// Ownership of a resource lock. Releases on drop.
#[must_use = "dropping the guard releases the lock immediately"]
pub struct LockGuard {
    manager: LockManager,
    resource: String,
    armed: bool,
}

impl LockGuard {
    const fn new(manager: LockManager, resource: String) -> Self {
        Self {
            manager,
            resource,
            armed: true,
        }
    }

    /// Locked resource.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Release the lock now.
    pub fn release(mut self) {
        self.release_inner();
    }

    /// Disarm the guard and return the resource id. The caller must call
    /// [`LockManager::release`] exactly once.
    #[must_use]
    pub fn into_raw(mut self) -> String {
        self.armed = false;
        std::mem::take(&mut self.resource)
    }

    fn release_inner(&mut self) {
        if self.armed {
            self.armed = false;
            self.manager.release(&self.resource);
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("resource", &self.resource)
            .field("armed", &self.armed)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
