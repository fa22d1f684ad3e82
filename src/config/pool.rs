//! Pool and submission configuration structures.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, Priority};

/// Prefix of the environment variables read by [`PoolConfig::from_env`].
pub const ENV_PREFIX: &str = "TASK_POOL_";

/// Pool configuration.
///
/// Durations are expressed in milliseconds so the structure round-trips
/// through JSON and environment variables unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Workers created at startup; the idle reaper never goes below this.
    pub min_workers: usize,
    /// Upper bound on the worker registry.
    pub max_workers: usize,
    /// Idle time after which a worker above the minimum is reclaimed.
    pub idle_timeout_ms: u64,
    /// Default per-attempt watchdog timeout.
    pub task_timeout_ms: u64,
    /// Default number of attempts before a task fails permanently.
    pub max_attempts: u32,
    /// Grow the registry on demand and run the periodic autoscaler.
    pub auto_scale: bool,
    /// Autoscaler period.
    pub scale_interval_ms: u64,
    /// Idle reaper period.
    pub idle_check_interval_ms: u64,
    /// Poll interval used while shutdown waits for the pool to drain.
    pub shutdown_poll_interval_ms: u64,
    /// Maximum pending tasks before fresh submissions are rejected.
    pub max_queue_depth: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 8,
            idle_timeout_ms: 60_000,
            task_timeout_ms: 30_000,
            max_attempts: 3,
            auto_scale: true,
            scale_interval_ms: 5_000,
            idle_check_interval_ms: 30_000,
            shutdown_poll_interval_ms: 100,
            max_queue_depth: None,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with `max_workers` matched to the host's CPU count.
    #[must_use]
    pub fn sized_for_host() -> Self {
        let cpus = num_cpus::get().max(1);
        Self {
            min_workers: cpus.min(2),
            max_workers: cpus,
            ..Self::default()
        }
    }

    /// Set the minimum worker count.
    #[must_use]
    pub const fn with_min_workers(mut self, min_workers: usize) -> Self {
        self.min_workers = min_workers;
        self
    }

    /// Set the maximum worker count.
    #[must_use]
    pub const fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the idle timeout used by the reaper.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout_ms = crate::util::duration_ms(idle_timeout);
        self
    }

    /// Set the default per-attempt task timeout.
    #[must_use]
    pub fn with_task_timeout(mut self, task_timeout: Duration) -> Self {
        self.task_timeout_ms = crate::util::duration_ms(task_timeout);
        self
    }

    /// Set the default attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Enable or disable autoscaling.
    #[must_use]
    pub const fn with_auto_scale(mut self, auto_scale: bool) -> Self {
        self.auto_scale = auto_scale;
        self
    }

    /// Set the autoscaler period.
    #[must_use]
    pub fn with_scale_interval(mut self, interval: Duration) -> Self {
        self.scale_interval_ms = crate::util::duration_ms(interval);
        self
    }

    /// Set the idle reaper period.
    #[must_use]
    pub fn with_idle_check_interval(mut self, interval: Duration) -> Self {
        self.idle_check_interval_ms = crate::util::duration_ms(interval);
        self
    }

    /// Set the shutdown drain poll interval.
    #[must_use]
    pub fn with_shutdown_poll_interval(mut self, interval: Duration) -> Self {
        self.shutdown_poll_interval_ms = crate::util::duration_ms(interval);
        self
    }

    /// Bound the pending queue.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = Some(depth);
        self
    }

    /// Idle timeout as a [`Duration`].
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Default task timeout as a [`Duration`].
    #[must_use]
    pub const fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    /// Autoscaler period as a [`Duration`].
    #[must_use]
    pub const fn scale_interval(&self) -> Duration {
        Duration::from_millis(self.scale_interval_ms)
    }

    /// Idle reaper period as a [`Duration`].
    #[must_use]
    pub const fn idle_check_interval(&self) -> Duration {
        Duration::from_millis(self.idle_check_interval_ms)
    }

    /// Shutdown poll interval as a [`Duration`].
    #[must_use]
    pub const fn shutdown_poll_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_interval_ms)
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("max_workers must be greater than 0".into());
        }
        if self.min_workers > self.max_workers {
            return Err(format!(
                "min_workers ({}) must not exceed max_workers ({})",
                self.min_workers, self.max_workers
            ));
        }
        if self.min_workers == 0 && !self.auto_scale {
            return Err("min_workers must be greater than 0 when auto_scale is disabled".into());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".into());
        }
        for (name, value) in [
            ("idle_timeout_ms", self.idle_timeout_ms),
            ("task_timeout_ms", self.task_timeout_ms),
            ("scale_interval_ms", self.scale_interval_ms),
            ("idle_check_interval_ms", self.idle_check_interval_ms),
            ("shutdown_poll_interval_ms", self.shutdown_poll_interval_ms),
        ] {
            if value == 0 {
                return Err(format!("{name} must be greater than 0"));
            }
        }
        if self.max_queue_depth == Some(0) {
            return Err("max_queue_depth must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse a pool configuration from a JSON string and validate it.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the environment (after reading a `.env` file
    /// if one is present). Each field maps to `TASK_POOL_<FIELD>` in upper
    /// case, e.g. `TASK_POOL_MAX_WORKERS`; unset variables keep defaults.
    ///
    /// # Errors
    ///
    /// Fails when a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub(crate) fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T, F>(lookup: &F, field: &str, target: &mut T) -> AppResult<()>
        where
            T: std::str::FromStr,
            T::Err: std::error::Error + Send + Sync + 'static,
            F: Fn(&str) -> Option<String>,
        {
            let key = format!("{ENV_PREFIX}{}", field.to_ascii_uppercase());
            if let Some(raw) = lookup(&key) {
                *target = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid value for {key}: {raw:?}"))?;
            }
            Ok(())
        }

        let mut cfg = Self::default();
        parse(&lookup, "min_workers", &mut cfg.min_workers)?;
        parse(&lookup, "max_workers", &mut cfg.max_workers)?;
        parse(&lookup, "idle_timeout_ms", &mut cfg.idle_timeout_ms)?;
        parse(&lookup, "task_timeout_ms", &mut cfg.task_timeout_ms)?;
        parse(&lookup, "max_attempts", &mut cfg.max_attempts)?;
        parse(&lookup, "auto_scale", &mut cfg.auto_scale)?;
        parse(&lookup, "scale_interval_ms", &mut cfg.scale_interval_ms)?;
        parse(&lookup, "idle_check_interval_ms", &mut cfg.idle_check_interval_ms)?;
        parse(&lookup, "shutdown_poll_interval_ms", &mut cfg.shutdown_poll_interval_ms)?;
        let mut depth = 0usize;
        parse(&lookup, "max_queue_depth", &mut depth)?;
        if depth > 0 {
            cfg.max_queue_depth = Some(depth);
        }

        cfg.validate()
            .map_err(|e| anyhow::anyhow!("pool configuration invalid: {e}"))?;
        Ok(cfg)
    }
}

/// Per-submission overrides. Unset fields fall back to the pool's
/// [`PoolConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Dispatch priority; higher runs first.
    pub priority: Priority,
    /// Per-attempt watchdog timeout.
    pub timeout: Option<Duration>,
    /// Attempt budget.
    pub max_attempts: Option<u32>,
}

impl SubmitOptions {
    /// Options with default priority and pool defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}
