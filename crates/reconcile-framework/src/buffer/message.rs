//! # Buffer Messages
//!
//! Requests sent from [`BufferClient`](super::BufferClient) to the
//! [`EventBuffer`](super::EventBuffer) actor. Every variant except fire-and-forget
//! notifications carries a oneshot `respond_to` channel.

use super::state::{Admission, BufferStats, Completion, ItemState, WorkItem};
use crate::error::DispatchError;
use crate::reconciler::Outcome;
use crate::resource::{ResourceEvent, ResourceId};
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by the buffer.
pub type Response<T> = oneshot::Sender<Result<T, DispatchError>>;

#[derive(Debug)]
pub enum BufferRequest {
    /// `respond_to` is `None` for fire-and-forget watcher notifications.
    Notify {
        event: ResourceEvent,
        respond_to: Option<Response<Admission>>,
    },
    NextReady {
        respond_to: Response<WorkItem>,
    },
    Complete {
        id: ResourceId,
        outcome: Outcome,
        respond_to: Response<Completion>,
    },
    Resync {
        respond_to: Response<usize>,
    },
    State {
        id: ResourceId,
        respond_to: Response<ItemState>,
    },
    Stats {
        respond_to: Response<BufferStats>,
    },
    /// Stop handing out work; waiting and future `NextReady` calls fail with `Draining`.
    Drain {
        respond_to: Response<()>,
    },
    Shutdown {
        respond_to: Response<BufferStats>,
    },
}
