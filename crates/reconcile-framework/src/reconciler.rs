//! # Reconciler Trait
//!
//! The `Reconciler` is the business-logic side of the dispatcher, the way an entity is the
//! business-logic side of an actor. The dispatcher guarantees it is never called twice
//! concurrently for the same [`ResourceId`]; it may be called repeatedly with coalesced
//! actions, so implementations must be idempotent.
//!
//! # Context Injection
//! Dependencies (clients, stores) are passed in as `Context` when the dispatcher is
//! started rather than when the reconciler is constructed.

use crate::error::ReconcileError;
use crate::resource::{ResourceAction, ResourceId};
use async_trait::async_trait;
use std::time::Duration;

/// What the reconciler wants to happen after a successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Settled; only a new event will dispatch this identity again.
    Done,
    /// Run again after the given delay even without a new event.
    RequeueAfter(Duration),
}

/// Brings one resource toward its desired state.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Dependencies injected into every call. Use `()` if none are needed.
    type Context: Send + Sync + 'static;

    async fn reconcile(
        &self,
        id: &ResourceId,
        action: ResourceAction,
        ctx: &Self::Context,
    ) -> Result<ReconcileAction, ReconcileError>;
}

/// How a dispatched work item ended, as reported back to the event buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Requeue(Duration),
    Failure(String),
    Fatal(String),
    /// Interrupted by shutdown; the item goes back to pending untouched.
    Aborted,
}

impl From<Result<ReconcileAction, ReconcileError>> for Outcome {
    fn from(result: Result<ReconcileAction, ReconcileError>) -> Self {
        match result {
            Ok(ReconcileAction::Done) => Outcome::Success,
            Ok(ReconcileAction::RequeueAfter(delay)) => Outcome::Requeue(delay),
            Err(ReconcileError::Transient(msg)) => Outcome::Failure(msg),
            Err(ReconcileError::Permanent(msg)) => Outcome::Fatal(msg),
        }
    }
}
