//! Tokio runtime spawner used to launch execution contexts and timers.

use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::core::PoolError;

/// Spawns pool work (attempts, watchdogs, periodic controllers) onto a tokio
/// runtime. Every attempt gets its own task, which is what allows a watchdog
/// to abort it cleanly.
#[derive(Clone, Debug)]
pub struct TokioSpawner {
    handle: Handle,
}

impl TokioSpawner {
    /// Create a spawner from a tokio runtime handle.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Spawner for the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// `PoolError::Runtime` when called outside a tokio runtime.
    pub fn current() -> Result<Self, PoolError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| PoolError::Runtime(e.to_string()))
    }

    /// Spawn a future and return its join handle.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(fut)
    }

    /// Underlying runtime handle.
    #[must_use]
    pub const fn handle(&self) -> &Handle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_outside_runtime_fails() {
        assert!(matches!(TokioSpawner::current(), Err(PoolError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_spawn_returns_output() {
        let spawner = TokioSpawner::current().unwrap();
        assert_eq!(spawner.spawn(async { 40 + 2 }).await.unwrap(), 42);
    }
}
