//! Tests for pool configuration

use std::time::Duration;

use super::PoolConfig;

#[test]
fn test_pool_config_creation() {
    let config = PoolConfig::new(2, 10);
    assert_eq!(config.min_connections_per_host(), 2);
    assert_eq!(config.max_connections_per_host(), 10);
    assert_eq!(config.acquire_timeout(), Duration::from_millis(30_000));
    assert_eq!(config.idle_timeout(), Duration::from_millis(300_000));
    assert_eq!(config.max_retries(), 3);
    assert_eq!(config.probe_command(), "true");
}

#[test]
fn test_pool_config_builders() {
    let config = PoolConfig::new(0, 2)
        .with_acquire_timeout_ms(50)
        .with_idle_timeout_ms(1_000)
        .with_connection_timeout_ms(250)
        .with_max_retries(2)
        .with_retry_delay_ms(20)
        .with_probe_timeout_ms(100)
        .with_probe_command("echo ok");

    assert_eq!(config.acquire_timeout(), Duration::from_millis(50));
    assert_eq!(config.idle_timeout(), Duration::from_millis(1_000));
    assert_eq!(config.connection_timeout(), Duration::from_millis(250));
    assert_eq!(config.max_retries(), 2);
    assert_eq!(config.retry_delay(), Duration::from_millis(20));
    assert_eq!(config.probe_timeout(), Duration::from_millis(100));
    assert_eq!(config.probe_command(), "echo ok");
}

#[test]
fn test_zero_intervals_disable_timers() {
    let config = PoolConfig::new(0, 2)
        .with_keep_alive_interval_ms(0)
        .with_health_check_interval_ms(0)
        .with_idle_sweep_interval_ms(0);

    assert!(config.keep_alive_interval().is_none());
    assert!(config.health_check_interval().is_none());
    assert!(config.idle_sweep_interval().is_none());

    let defaults = PoolConfig::default();
    assert_eq!(defaults.keep_alive_interval(), Some(Duration::from_secs(30)));
    assert_eq!(defaults.health_check_interval(), Some(Duration::from_secs(60)));
    assert_eq!(defaults.idle_sweep_interval(), Some(Duration::from_secs(10)));
}

#[test]
fn test_pool_config_default() {
    let config = PoolConfig::default();
    assert_eq!(config.min_connections_per_host(), 1);
    assert_eq!(config.max_connections_per_host(), 4);
    assert!(config.validate().is_ok());
}

#[test]
#[should_panic(expected = "max_size must be greater than 0")]
fn test_pool_config_invalid_max_size() {
    PoolConfig::new(0, 0);
}

#[test]
#[should_panic(expected = "min_size (10) cannot exceed max_size (5)")]
fn test_pool_config_min_exceeds_max() {
    PoolConfig::new(10, 5);
}

#[test]
fn test_pool_config_partial_toml_uses_defaults() {
    let config: PoolConfig = toml::from_str(
        r#"
            max_connections_per_host = 2
            acquire_timeout_ms = 50
        "#,
    )
    .expect("parse pool config");

    assert_eq!(config.max_connections_per_host(), 2);
    assert_eq!(config.min_connections_per_host(), 1);
    assert_eq!(config.acquire_timeout(), Duration::from_millis(50));
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_rejects_bad_sizing() {
    let config: PoolConfig = toml::from_str(
        r#"
            max_connections_per_host = 2
            min_connections_per_host = 3
        "#,
    )
    .expect("parse pool config");

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("cannot exceed"), "unexpected: {}", err);

    let config: PoolConfig =
        toml::from_str("max_connections_per_host = 0").expect("parse pool config");
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_empty_probe_command() {
    let config = PoolConfig::default().with_probe_command("  ");
    assert!(config.validate().is_err());
}

#[test]
fn test_pool_config_serialization() {
    let config = PoolConfig::new(2, 8).with_acquire_timeout_ms(5_000);

    let json = serde_json::to_string(&config).expect("serialize");
    let deserialized: PoolConfig = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(deserialized, config);
}
