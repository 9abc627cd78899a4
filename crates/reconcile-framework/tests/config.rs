use reconcile_framework::{ConfigError, DispatcherConfig};
use std::time::Duration;

#[test]
fn test_defaults_fill_missing_keys() {
    let config = DispatcherConfig::from_toml_str("worker_count = 8\nmax_pending = 100\n").unwrap();

    assert_eq!(config.worker_count, 8);
    assert_eq!(config.max_pending, Some(100));
    assert_eq!(config.max_attempts, DispatcherConfig::default().max_attempts);
    assert_eq!(config.resync_period(), None);
}

#[test]
fn test_durations_from_millis() {
    let raw = r#"
        base_retry_delay_ms = 50
        max_retry_delay_ms = 5000
        resync_period_ms = 30000
        drain_timeout_ms = 1500
    "#;
    let config = DispatcherConfig::from_toml_str(raw).unwrap();

    assert_eq!(config.base_retry_delay(), Duration::from_millis(50));
    assert_eq!(config.max_retry_delay(), Duration::from_secs(5));
    assert_eq!(config.resync_period(), Some(Duration::from_secs(30)));
    assert_eq!(config.drain_timeout(), Duration::from_millis(1500));
}

#[test]
fn test_invalid_values_rejected() {
    assert!(matches!(
        DispatcherConfig::from_toml_str("worker_count = 0"),
        Err(ConfigError::NoWorkers)
    ));
    assert!(matches!(
        DispatcherConfig::from_toml_str("max_attempts = 0"),
        Err(ConfigError::NoAttempts)
    ));
    assert!(matches!(
        DispatcherConfig::from_toml_str("base_retry_delay_ms = 10\nmax_retry_delay_ms = 5"),
        Err(ConfigError::DelayRange { base: 10, max: 5 })
    ));
    assert!(matches!(
        DispatcherConfig::from_toml_str("max_pending = 0"),
        Err(ConfigError::NoCapacity)
    ));
    assert!(matches!(
        DispatcherConfig::from_toml_str("worker_count = \"many\""),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let result = DispatcherConfig::from_file("/definitely/not/here/dispatcher.toml");
    assert!(matches!(result, Err(ConfigError::Io(_))));
}
