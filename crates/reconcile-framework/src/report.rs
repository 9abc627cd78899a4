//! Surfacing given-up work items to an external error-reporting collaborator.

use crate::error::GiveUpReason;
use crate::resource::{ResourceAction, ResourceId};
use tokio::sync::mpsc;
use tracing::error;

/// A work item that will not be retried automatically any more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiveUpRecord {
    pub id: ResourceId,
    pub action: ResourceAction,
    pub attempts: u32,
    pub reason: GiveUpReason,
}

/// Receives every give-up exactly once.
///
/// Called from the event buffer's task, so implementations must not block.
pub trait ErrorReporter: Send + Sync + 'static {
    fn report(&self, record: &GiveUpRecord);
}

/// Default reporter: one error-level log line per give-up.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, record: &GiveUpRecord) {
        error!(
            id = %record.id,
            action = %record.action,
            attempts = record.attempts,
            reason = %record.reason,
            "Gave up reconciling"
        );
    }
}

/// Forwards records to a channel, e.g. an alerting task.
impl ErrorReporter for mpsc::UnboundedSender<GiveUpRecord> {
    fn report(&self, record: &GiveUpRecord) {
        let _ = self.send(record.clone());
    }
}
