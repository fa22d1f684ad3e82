//! Configuration models for pools and submissions.

pub mod pool;

pub use pool::{PoolConfig, SubmitOptions, ENV_PREFIX};
