//! Sample configuration: the dispatcher section plus the simulated watcher and its
//! demo script.
//!
//! ```toml
//! [dispatcher]
//! worker_count = 2
//! base_retry_delay_ms = 200
//!
//! [watcher]
//! namespace = "demo"
//! event_interval_ms = 50
//! flaky_failures = 2
//!
//! [[script]]
//! op = "apply"
//! name = "app"
//! data = { LOG_LEVEL = "info" }
//! ```

use crate::watcher::WatchStep;
use reconcile_framework::{ConfigError, DispatchError, DispatcherConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("dispatcher error: {0}")]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub kind: String,
    pub namespace: String,
    pub event_interval_ms: u64,
    /// Transient failures the reconciler injects for each `flaky-*` entry.
    pub flaky_failures: u32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            kind: "ConfigMap".to_string(),
            namespace: "default".to_string(),
            event_interval_ms: 100,
            flaky_failures: 2,
        }
    }
}

impl WatcherConfig {
    pub fn event_interval(&self) -> Duration {
        Duration::from_millis(self.event_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    pub dispatcher: DispatcherConfig,
    pub watcher: WatcherConfig,
    pub script: Vec<WatchStep>,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig::default(),
            watcher: WatcherConfig::default(),
            script: default_script(),
        }
    }
}

impl SampleConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.dispatcher.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Exercises coalescing, a delete, a flaky target and a permanently invalid entry.
fn default_script() -> Vec<WatchStep> {
    let apply = |name: &str, pairs: &[(&str, &str)]| WatchStep::Apply {
        name: name.to_string(),
        data: data(pairs),
        refresh_after_ms: None,
    };
    vec![
        apply("app", &[("LOG_LEVEL", "info")]),
        apply("app", &[("LOG_LEVEL", "debug")]),
        apply("flaky-db", &[("POOL_SIZE", "16")]),
        apply("scratch", &[("TMP", "1")]),
        WatchStep::Delete {
            name: "scratch".to_string(),
        },
        apply("invalid-entry", &[("bad key", "x")]),
    ]
}
