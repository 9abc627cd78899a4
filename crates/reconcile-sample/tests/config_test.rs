use reconcile_framework::ConfigError;
use reconcile_sample::config::SampleConfig;
use reconcile_sample::watcher::WatchStep;
use std::time::Duration;

#[test]
fn test_bundled_config_parses() {
    let config = SampleConfig::from_toml_str(include_str!("../reconcile.toml")).unwrap();

    assert_eq!(config.dispatcher.worker_count, 2);
    assert_eq!(config.dispatcher.base_retry_delay(), Duration::from_millis(200));
    assert_eq!(config.dispatcher.max_pending, Some(1000));
    assert_eq!(config.watcher.namespace, "demo");
    assert_eq!(config.watcher.event_interval(), Duration::from_millis(50));
    assert_eq!(config.script.len(), 6);
    assert_eq!(
        config.script[4],
        WatchStep::Delete {
            name: "scratch".to_string()
        }
    );
}

#[test]
fn test_empty_document_uses_defaults() {
    let config = SampleConfig::from_toml_str("").unwrap();
    assert_eq!(config, SampleConfig::default());
    assert!(!config.script.is_empty());
}

#[test]
fn test_invalid_dispatcher_section_is_rejected() {
    let raw = "[dispatcher]\nbase_retry_delay_ms = 5000\nmax_retry_delay_ms = 10\n";
    assert!(matches!(
        SampleConfig::from_toml_str(raw),
        Err(ConfigError::DelayRange { base: 5000, max: 10 })
    ));
}

#[test]
fn test_unknown_script_op_is_a_parse_error() {
    let raw = "[[script]]\nop = \"patch\"\nname = \"x\"\n";
    assert!(matches!(
        SampleConfig::from_toml_str(raw),
        Err(ConfigError::Parse(_))
    ));
}
