use reconcile_framework::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A key/value configuration object, the resource kind the sample controller mirrors.
///
/// `generation` is bumped by the watcher on every change so the reconciler can tell
/// whether the mirror copy is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub id: ResourceId,
    pub data: BTreeMap<String, String>,
    pub generation: u64,
    /// Ask for a periodic re-check after each successful reconcile.
    #[serde(default)]
    pub refresh_after_ms: Option<u64>,
}

impl ConfigEntry {
    pub fn new(id: ResourceId, data: BTreeMap<String, String>) -> Self {
        Self {
            id,
            data,
            generation: 1,
            refresh_after_ms: None,
        }
    }

    pub fn with_refresh(mut self, every: Duration) -> Self {
        self.refresh_after_ms = Some(u64::try_from(every.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn refresh_after(&self) -> Option<Duration> {
        self.refresh_after_ms.map(Duration::from_millis)
    }

    /// Returns the first key the target system would refuse.
    pub fn invalid_key(&self) -> Option<&str> {
        self.data
            .keys()
            .map(String::as_str)
            .find(|key| key.is_empty() || key.chars().any(char::is_whitespace))
    }
}
