//! Builder to construct a task pool from configuration, sinks and a runtime.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::config::PoolConfig;
use crate::core::{EventSink, PoolError, TaskPool};
use crate::runtime::TokioSpawner;

/// Builder for [`TaskPool`].
#[derive(Default)]
pub struct TaskPoolBuilder {
    config: PoolConfig,
    name: Option<String>,
    sinks: Vec<Arc<dyn EventSink>>,
    runtime: Option<Handle>,
}

impl fmt::Debug for TaskPoolBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPoolBuilder")
            .field("config", &self.config)
            .field("name", &self.name)
            .field("sinks", &self.sinks.len())
            .field("runtime", &self.runtime.is_some())
            .finish()
    }
}

impl TaskPoolBuilder {
    /// Create a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configuration.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Name the pool in logs and events instead of using its id.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach an event sink.
    #[must_use]
    pub fn with_event_sink(self, sink: impl EventSink + 'static) -> Self {
        self.with_shared_sink(Arc::new(sink))
    }

    /// Attach an already shared event sink.
    #[must_use]
    pub fn with_shared_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Run the pool on `handle` instead of the current runtime.
    #[must_use]
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Configuration the pool will be built with.
    #[must_use]
    pub const fn pool_config(&self) -> &PoolConfig {
        &self.config
    }

    /// Build the pool.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidConfig` for an invalid configuration and
    /// `PoolError::Runtime` when no runtime was given and none is current.
    pub fn build(self) -> Result<TaskPool, PoolError> {
        let spawner = match self.runtime {
            Some(handle) => TokioSpawner::new(handle),
            None => TokioSpawner::current()?,
        };
        TaskPool::from_parts(self.config, self.name, self.sinks, spawner)
    }
}
