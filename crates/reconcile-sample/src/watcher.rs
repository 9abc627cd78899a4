//! # Simulated Watcher
//!
//! Stands in for an informer: it owns writes to the desired [`Store`] and emits one
//! [`ResourceEvent`] per change through an injected [`BufferClient`]. Emitting never
//! waits on the dispatcher.

use crate::model::{ConfigEntry, Store};
use reconcile_framework::{BufferClient, DispatchError, ResourceAction, ResourceEvent, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// One scripted change, as written in the `[[script]]` tables of the sample config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum WatchStep {
    Apply {
        name: String,
        #[serde(default)]
        data: BTreeMap<String, String>,
        #[serde(default)]
        refresh_after_ms: Option<u64>,
    },
    Delete {
        name: String,
    },
}

#[derive(Debug, Clone)]
pub struct SimulatedWatcher {
    client: BufferClient,
    desired: Store,
    kind: String,
    namespace: String,
}

impl SimulatedWatcher {
    pub fn new(
        client: BufferClient,
        desired: Store,
        kind: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            client,
            desired,
            kind: kind.into(),
            namespace: namespace.into(),
        }
    }

    pub fn id_for(&self, name: &str) -> ResourceId {
        ResourceId::namespaced(self.kind.as_str(), self.namespace.as_str(), name)
    }

    /// Creates or updates a desired entry and emits ADDED or UPDATED.
    pub fn apply(
        &self,
        name: &str,
        data: BTreeMap<String, String>,
        refresh_after_ms: Option<u64>,
    ) -> Result<ResourceAction, DispatchError> {
        let id = self.id_for(name);
        let generation = self
            .desired
            .get(&id)
            .map_or(1, |previous| previous.generation + 1);
        let mut entry = ConfigEntry::new(id.clone(), data);
        entry.generation = generation;
        entry.refresh_after_ms = refresh_after_ms;

        let action = match self.desired.upsert(entry) {
            Some(_) => ResourceAction::Updated,
            None => ResourceAction::Added,
        };
        self.emit(action, id)?;
        Ok(action)
    }

    /// Removes a desired entry and emits DELETED. Returns `false` if it did not exist.
    pub fn delete(&self, name: &str) -> Result<bool, DispatchError> {
        let id = self.id_for(name);
        if self.desired.remove(&id).is_none() {
            return Ok(false);
        }
        self.emit(ResourceAction::Deleted, id)?;
        Ok(true)
    }

    /// Emits GENERIC for every desired entry, like an informer relist.
    pub fn relist(&self) -> Result<usize, DispatchError> {
        let ids = self.desired.ids();
        let count = ids.len();
        for id in ids {
            self.emit(ResourceAction::Generic, id)?;
        }
        info!(count, "Relisted desired state");
        Ok(count)
    }

    /// Plays a script, pausing `interval` between steps.
    pub async fn replay(&self, steps: &[WatchStep], interval: Duration) -> Result<(), DispatchError> {
        for step in steps {
            match step {
                WatchStep::Apply {
                    name,
                    data,
                    refresh_after_ms,
                } => {
                    self.apply(name, data.clone(), *refresh_after_ms)?;
                }
                WatchStep::Delete { name } => {
                    self.delete(name)?;
                }
            }
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }
        Ok(())
    }

    fn emit(&self, action: ResourceAction, id: ResourceId) -> Result<(), DispatchError> {
        debug!(%id, %action, "Observed change");
        self.client.notify(ResourceEvent::new(action, id))
    }
}
