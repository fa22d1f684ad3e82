//! Infrastructure adapters backing the coordinator.

pub mod queue;
pub use queue::InMemoryQueue;
