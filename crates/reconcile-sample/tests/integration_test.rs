use reconcile_framework::{DispatcherConfig, GiveUpReason};
use reconcile_sample::config::{SampleConfig, WatcherConfig};
use reconcile_sample::lifecycle::ControllerSystem;
use std::collections::BTreeMap;
use std::time::Duration;

fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn quiet_config() -> SampleConfig {
    SampleConfig {
        watcher: WatcherConfig {
            event_interval_ms: 0,
            ..WatcherConfig::default()
        },
        ..SampleConfig::default()
    }
}

/// Full end-to-end run of the demo script with the real dispatcher.
#[tokio::test(start_paused = true)]
async fn test_full_mirror_controller_integration() {
    let config = quiet_config();
    let script = config.script.clone();
    let mut system = ControllerSystem::new(config).expect("system starts");

    system
        .watcher
        .replay(&script, Duration::ZERO)
        .await
        .expect("script replays");
    assert!(system.wait_until_idle(Duration::from_secs(60)).await.unwrap());

    let app = system
        .mirror
        .get(&system.watcher.id_for("app"))
        .expect("app mirrored");
    assert_eq!(app.generation, 2);
    assert_eq!(app.data, data(&[("LOG_LEVEL", "debug")]));
    assert!(system.mirror.contains(&system.watcher.id_for("flaky-db")));
    assert!(!system.mirror.contains(&system.watcher.id_for("scratch")));
    assert!(!system.mirror.contains(&system.watcher.id_for("invalid-entry")));

    let alerts = system.take_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, system.watcher.id_for("invalid-entry"));
    assert!(matches!(alerts[0].reason, GiveUpReason::Permanent { .. }));

    let report = system.shutdown().await.expect("clean shutdown");
    assert!(report.drained);
    assert_eq!(report.stats.given_up, 1);
}

#[tokio::test(start_paused = true)]
async fn test_relist_after_convergence_changes_nothing() {
    let mut system = ControllerSystem::new(quiet_config()).unwrap();
    system
        .watcher
        .apply("app", data(&[("A", "1")]), None)
        .unwrap();
    system
        .watcher
        .apply("web", data(&[("B", "2")]), None)
        .unwrap();
    assert!(system.wait_until_idle(Duration::from_secs(10)).await.unwrap());
    let before = system.mirror.snapshot();

    assert_eq!(system.watcher.relist().unwrap(), 2);
    assert!(system.wait_until_idle(Duration::from_secs(10)).await.unwrap());

    assert_eq!(system.mirror.snapshot(), before);
    assert!(system.take_alerts().is_empty());
    system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_periodic_resync_repairs_drift() {
    let config = SampleConfig {
        dispatcher: DispatcherConfig::default().with_resync_period(Duration::from_secs(1)),
        ..quiet_config()
    };
    let system = ControllerSystem::new(config).unwrap();
    let id = system.watcher.id_for("app");
    system
        .watcher
        .apply("app", data(&[("A", "1")]), None)
        .unwrap();
    assert!(system.wait_until_idle(Duration::from_secs(10)).await.unwrap());

    // Someone deletes the mirror copy behind the controller's back.
    system.mirror.remove(&id);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(system.wait_until_idle(Duration::from_secs(10)).await.unwrap());

    assert!(system.mirror.contains(&id));
    system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_delete_removes_mirror_copy() {
    let system = ControllerSystem::new(quiet_config()).unwrap();
    let id = system.watcher.id_for("temp");
    system
        .watcher
        .apply("temp", data(&[("X", "1")]), None)
        .unwrap();
    assert!(system.wait_until_idle(Duration::from_secs(10)).await.unwrap());
    assert!(system.mirror.contains(&id));

    assert!(system.watcher.delete("temp").unwrap());
    assert!(!system.watcher.delete("temp").unwrap());
    assert!(system.wait_until_idle(Duration::from_secs(10)).await.unwrap());

    assert!(!system.mirror.contains(&id));
    let stats = system.stats().await.unwrap();
    assert_eq!(stats.known, 0);
    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_dispatcher_config_is_rejected() {
    let config = SampleConfig {
        dispatcher: DispatcherConfig::default().with_max_attempts(0),
        ..SampleConfig::default()
    };
    assert!(ControllerSystem::new(config).is_err());
}
