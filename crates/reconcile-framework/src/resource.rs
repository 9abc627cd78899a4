//! # Resources, Actions & Events
//!
//! The value types that flow from watchers into the dispatcher. A [`ResourceEvent`] is an
//! immutable notification: *which* resource changed ([`ResourceId`]) and *how*
//! ([`ResourceAction`]). Events carry no identity of their own beyond these fields.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::time::SystemTime;

/// Uniquely names a watched resource.
///
/// Equality defines "same resource": two events with equal ids are coalesced into one
/// work item. Ordering is lexicographic on `(kind, namespace, name)` so that ids sort
/// deterministically in logs and snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceId {
    /// Creates an id for a namespaced resource.
    pub fn namespaced(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Creates an id for a cluster-scoped resource.
    pub fn cluster_scoped(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: None,
            name: name.into(),
        }
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// What happened to a resource.
///
/// `Generic` is synthesized by periodic resync and is not tied to an observed diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceAction {
    Added,
    Updated,
    Deleted,
    Generic,
}

impl ResourceAction {
    /// Merges a later action into this pending one.
    ///
    /// - `Deleted` wins regardless of position.
    /// - `Generic` never overrides a specific action.
    /// - `Added` followed by `Added` stays `Added`; any other mix of `Added`/`Updated`
    ///   collapses to `Updated`.
    pub fn coalesce(self, later: ResourceAction) -> ResourceAction {
        use ResourceAction::*;
        match (self, later) {
            (Deleted, _) | (_, Deleted) => Deleted,
            (Generic, next) => next,
            (current, Generic) => current,
            (Added, Added) => Added,
            _ => Updated,
        }
    }

    /// `true` for actions that come from an observed change rather than a resync.
    pub fn is_specific(self) -> bool {
        !matches!(self, ResourceAction::Generic)
    }
}

impl Display for ResourceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ResourceAction::Added => "ADDED",
            ResourceAction::Updated => "UPDATED",
            ResourceAction::Deleted => "DELETED",
            ResourceAction::Generic => "GENERIC",
        };
        f.write_str(tag)
    }
}

/// A change notification emitted by a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEvent {
    id: ResourceId,
    action: ResourceAction,
    observed_at: SystemTime,
}

impl ResourceEvent {
    pub fn new(action: ResourceAction, id: ResourceId) -> Self {
        Self {
            id,
            action,
            observed_at: SystemTime::now(),
        }
    }

    pub fn added(id: ResourceId) -> Self {
        Self::new(ResourceAction::Added, id)
    }

    pub fn updated(id: ResourceId) -> Self {
        Self::new(ResourceAction::Updated, id)
    }

    pub fn deleted(id: ResourceId) -> Self {
        Self::new(ResourceAction::Deleted, id)
    }

    pub fn generic(id: ResourceId) -> Self {
        Self::new(ResourceAction::Generic, id)
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn action(&self) -> ResourceAction {
        self.action
    }

    pub fn observed_at(&self) -> SystemTime {
        self.observed_at
    }

    /// Splits the event into its identity and action.
    pub fn into_parts(self) -> (ResourceId, ResourceAction) {
        (self.id, self.action)
    }
}

impl Display for ResourceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceEvent{{action={}, resource={}}}", self.action, self.id)
    }
}
