//! Tests for configuration validation and loading

use std::time::Duration;

use prometheus_task_pool::config::{PoolConfig, SubmitOptions};
use prometheus_task_pool::core::Priority;

#[test]
fn test_pool_config_defaults() {
    let config = PoolConfig::default();
    assert_eq!(config.min_workers, 2);
    assert_eq!(config.max_workers, 8);
    assert_eq!(config.idle_timeout(), Duration::from_secs(60));
    assert_eq!(config.task_timeout(), Duration::from_secs(30));
    assert_eq!(config.max_attempts, 3);
    assert!(config.auto_scale);
    assert_eq!(config.scale_interval(), Duration::from_secs(5));
    assert_eq!(config.idle_check_interval(), Duration::from_secs(30));
    assert!(config.validate().is_ok());
}

#[test]
fn test_pool_config_min_above_max() {
    let invalid = PoolConfig::new().with_min_workers(9).with_max_workers(4);
    assert!(invalid.validate().unwrap_err().contains("min_workers"));
}

#[test]
fn test_pool_config_zero_max_workers() {
    let invalid = PoolConfig::new().with_min_workers(0).with_max_workers(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_zero_min_needs_auto_scale() {
    let elastic = PoolConfig::new().with_min_workers(0);
    assert!(elastic.validate().is_ok());

    let stuck = elastic.with_auto_scale(false);
    assert!(stuck.validate().is_err());
}

#[test]
fn test_pool_config_zero_intervals() {
    let invalid = PoolConfig::new().with_task_timeout(Duration::ZERO);
    assert!(invalid.validate().unwrap_err().contains("task_timeout_ms"));

    let invalid = PoolConfig::new().with_max_attempts(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_from_json() {
    let config =
        PoolConfig::from_json_str(r#"{"max_workers": 16, "idle_timeout_ms": 500}"#).unwrap();
    assert_eq!(config.max_workers, 16);
    assert_eq!(config.idle_timeout(), Duration::from_millis(500));
    assert_eq!(config.min_workers, 2);

    let err = PoolConfig::from_json_str(r#"{"min_workers": 10, "max_workers": 1}"#).unwrap_err();
    assert!(err.contains("min_workers"));
    assert!(PoolConfig::from_json_str("not json").unwrap_err().starts_with("parse error"));
}

#[test]
fn test_sized_for_host_is_valid() {
    let config = PoolConfig::sized_for_host();
    assert!(config.max_workers >= 1);
    assert!(config.validate().is_ok());
}

#[test]
fn test_submit_options_builder() {
    let options = SubmitOptions::new()
        .with_priority(Priority::HIGH)
        .with_timeout(Duration::from_secs(2))
        .with_max_attempts(5);
    assert_eq!(options.priority, Priority(10));
    assert_eq!(options.timeout, Some(Duration::from_secs(2)));
    assert_eq!(options.max_attempts, Some(5));

    let defaults = SubmitOptions::default();
    assert_eq!(defaults.priority, Priority::NORMAL);
    assert_eq!(defaults.timeout, None);
}
