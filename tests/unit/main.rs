//! Unit tests for individual components

mod config_test;
mod error_test;
mod events_test;
mod runtime_test;
