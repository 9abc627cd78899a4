//! # Reconcile Framework
//!
//! This crate turns unordered, possibly duplicated resource-change notifications into a
//! deduplicated stream of reconciliation work, with **at most one reconciliation active
//! per resource at a time**.
//!
//! ## Architecture Overview
//!
//! The framework separates concerns into layers, the same way an actor system separates
//! entity logic from the message loop:
//!
//! 1. **Data Layer** ([`ResourceId`], [`ResourceAction`], [`ResourceEvent`]) - what changed
//! 2. **Buffer Layer** ([`EventBuffer`], [`BufferClient`]) - an actor that coalesces events
//!    per identity and owns the pending/in-flight state
//! 3. **Execution Layer** ([`Dispatcher`]) - a fixed worker pool pulling ready items and
//!    calling your [`Reconciler`]
//! 4. **Policy Layer** ([`RetryPolicy`], [`ErrorReporter`]) - backoff, give-up and where
//!    give-ups are surfaced
//!
//! ```text
//! watchers ─► ResourceEvent ─► EventBuffer (coalesce) ─► Dispatcher ─► Reconciler
//!                                   ▲                        │
//!                                   └──── RetryPolicy ◄──────┘
//! ```
//!
//! ## Coalescing
//!
//! While an identity is pending, new events merge into one action
//! ([`ResourceAction::coalesce`]): `DELETED` wins, `ADDED`+`UPDATED` become `UPDATED`,
//! and a resync (`GENERIC`) never hides a real change. While an identity is in flight,
//! new events only set a *pending-next* marker; on success the identity is queued again
//! immediately.
//!
//! ## Outcomes
//!
//! | Reconciler returns | Outcome | Effect |
//! |--------------------|---------|--------|
//! | `Ok(Done)` | Success | settled, or requeued now if pending-next |
//! | `Ok(RequeueAfter(d))` | Requeue | queued again after `d`, capped by the [`RetryPolicy`] |
//! | `Err(Transient)` / panic | Failure | retried with backoff until `max_attempts` |
//! | `Err(Permanent)` | Fatal | given up and reported |
//!
//! ## Concurrency Model
//!
//! - The buffer is a single Tokio task; every state change goes through its mailbox, so
//!   no locks guard the pending map.
//! - [`BufferClient::notify`] is a non-blocking send; watchers are never suspended.
//! - Workers are independent Tokio tasks; each reconcile call runs in its own task so a
//!   panic becomes a retryable failure.
//!
//! ## Testing
//!
//! The [`mock`] module provides a scripted [`MockReconciler`](mock::MockReconciler) and a
//! [`RecordingReporter`](mock::RecordingReporter).

pub mod buffer;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod mock;
pub mod reconciler;
pub mod report;
pub mod resource;
pub mod retry;
pub mod tracing;

// Re-export core types for convenience
pub use buffer::{
    Admission, BufferClient, BufferStats, Completion, EventBuffer, ItemState, PendingSet,
    WorkItem,
};
pub use config::{ConfigError, DispatcherConfig};
pub use dispatcher::{Dispatcher, DispatcherHandle, ShutdownReport};
pub use error::{DispatchError, GiveUpReason, ReconcileError};
pub use reconciler::{Outcome, ReconcileAction, Reconciler};
pub use report::{ErrorReporter, GiveUpRecord, TracingReporter};
pub use resource::{ResourceAction, ResourceEvent, ResourceId};
pub use retry::{ExponentialBackoff, RetryPolicy};
