//! # Dispatcher Errors
//!
//! Error types shared by the buffer, the dispatcher and reconcilers. Transient
//! reconcile failures are absorbed by the retry policy; everything that ends automatic
//! processing of an identity is described by a [`GiveUpReason`].

use crate::config::ConfigError;
use crate::resource::{ResourceAction, ResourceId};

/// Errors raised by the dispatcher machinery itself.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Event buffer closed")]
    BufferClosed,
    #[error("Event buffer dropped response channel")]
    BufferDropped,
    #[error("Event buffer is draining; no new work is handed out")]
    Draining,
    #[error("Event buffer full: rejected {action} for {id}")]
    BufferOverflow {
        id: ResourceId,
        action: ResourceAction,
    },
    #[error("Not in flight: {0}")]
    NotInFlight(ResourceId),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Worker task failed: {0}")]
    WorkerPanicked(String),
}

/// Errors returned by a [`Reconciler`](crate::Reconciler).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// Retryable; scheduled again with backoff.
    #[error("transient: {0}")]
    Transient(String),
    /// Not retryable; the identity is given up and reported.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl ReconcileError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }
}

/// Why an identity stopped being retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GiveUpReason {
    #[error("retries exhausted, last error: {last_error}")]
    RetriesExhausted { last_error: String },
    #[error("permanent error: {error}")]
    Permanent { error: String },
}
