use super::ConfigEntry;
use reconcile_framework::ResourceId;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared in-memory table of config entries.
///
/// Used both for the desired state (written by the watcher) and for the mirror the
/// reconciler maintains. Locks are never held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct Store {
    entries: Arc<Mutex<BTreeMap<ResourceId, ConfigEntry>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ResourceId, ConfigEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: &ResourceId) -> Option<ConfigEntry> {
        self.lock().get(id).cloned()
    }

    /// Inserts or replaces an entry, returning the previous one.
    pub fn upsert(&self, entry: ConfigEntry) -> Option<ConfigEntry> {
        self.lock().insert(entry.id.clone(), entry)
    }

    pub fn remove(&self, id: &ResourceId) -> Option<ConfigEntry> {
        self.lock().remove(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn ids(&self) -> Vec<ResourceId> {
        self.lock().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<ConfigEntry> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
