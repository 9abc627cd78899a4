//! # Mirror Reconciler
//!
//! Level-based: the action only says *that* something changed. The reconciler always
//! reads the desired [`Store`] and makes the mirror match it, so a coalesced or
//! resync-triggered call does the right thing regardless of which events were merged.
//!
//! | Desired state | Mirror | Result |
//! |---------------|--------|--------|
//! | absent | present | mirror copy removed |
//! | present, invalid key | any | `Permanent` error, never retried |
//! | present | stale or absent | copied (after simulated outages for `flaky-*` names) |
//! | present | same generation | nothing to do |

use crate::model::{ConfigEntry, Store};
use async_trait::async_trait;
use reconcile_framework::{ReconcileAction, ReconcileError, Reconciler, ResourceAction, ResourceId};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Stores shared by every reconcile call.
#[derive(Debug, Clone, Default)]
pub struct MirrorContext {
    pub desired: Store,
    pub mirror: Store,
}

/// Copies desired config entries into the mirror store.
#[derive(Debug, Default)]
pub struct MirrorReconciler {
    /// Transient failures injected for each `flaky-*` resource before it succeeds.
    flaky_failures: u32,
    outages: Mutex<HashMap<ResourceId, u32>>,
}

impl MirrorReconciler {
    pub fn new(flaky_failures: u32) -> Self {
        Self {
            flaky_failures,
            outages: Mutex::new(HashMap::new()),
        }
    }

    /// Simulates a target that is unavailable for the first few writes of `flaky-*` names.
    fn target_unavailable(&self, id: &ResourceId) -> bool {
        if !id.name.starts_with("flaky-") {
            return false;
        }
        let mut outages = self.outages.lock().unwrap_or_else(PoisonError::into_inner);
        let seen = outages.entry(id.clone()).or_insert(0);
        if *seen < self.flaky_failures {
            *seen += 1;
            true
        } else {
            false
        }
    }

    fn apply(&self, entry: &ConfigEntry, mirror: &Store) -> Result<(), ReconcileError> {
        if let Some(key) = entry.invalid_key() {
            return Err(ReconcileError::permanent(format!(
                "key {key:?} is not a valid config key"
            )));
        }
        if mirror
            .get(&entry.id)
            .is_some_and(|current| current.generation >= entry.generation)
        {
            debug!(generation = entry.generation, "Mirror already up to date");
            return Ok(());
        }
        if self.target_unavailable(&entry.id) {
            return Err(ReconcileError::transient("mirror target unavailable"));
        }
        mirror.upsert(entry.clone());
        info!(generation = entry.generation, keys = entry.data.len(), "Mirrored");
        Ok(())
    }
}

#[async_trait]
impl Reconciler for MirrorReconciler {
    type Context = MirrorContext;

    async fn reconcile(
        &self,
        id: &ResourceId,
        action: ResourceAction,
        ctx: &MirrorContext,
    ) -> Result<ReconcileAction, ReconcileError> {
        debug!(%action, "Comparing desired and mirrored state");

        let Some(entry) = ctx.desired.get(id) else {
            if ctx.mirror.remove(id).is_some() {
                info!("Removed mirror copy");
            }
            return Ok(ReconcileAction::Done);
        };

        self.apply(&entry, &ctx.mirror)?;
        Ok(entry
            .refresh_after()
            .map_or(ReconcileAction::Done, ReconcileAction::RequeueAfter))
    }
}
