//! # Buffer Client
//!
//! The handle watchers and workers use to talk to the [`EventBuffer`](super::EventBuffer).
//! It holds only a channel sender, so it is cheap to clone and is the thing injected
//! into every watcher.

use super::message::{BufferRequest, Response};
use super::state::{Admission, BufferStats, Completion, ItemState, WorkItem};
use crate::error::DispatchError;
use crate::reconciler::Outcome;
use crate::resource::{ResourceEvent, ResourceId};
use futures::Stream;
use tokio::sync::{mpsc, oneshot};

/// Cloneable, type-safe access to the event buffer.
#[derive(Debug, Clone)]
pub struct BufferClient {
    sender: mpsc::UnboundedSender<BufferRequest>,
}

impl BufferClient {
    pub fn new(sender: mpsc::UnboundedSender<BufferRequest>) -> Self {
        Self { sender }
    }

    /// Hands an event to the buffer without waiting. Never suspends the caller.
    ///
    /// Overflow rejections are logged and counted by the buffer; use [`add`](Self::add)
    /// to observe them.
    pub fn notify(&self, event: ResourceEvent) -> Result<(), DispatchError> {
        self.sender
            .send(BufferRequest::Notify {
                event,
                respond_to: None,
            })
            .map_err(|_| DispatchError::BufferClosed)
    }

    /// Inserts or coalesces an event and reports how it was absorbed.
    pub async fn add(&self, event: ResourceEvent) -> Result<Admission, DispatchError> {
        self.request(|respond_to| BufferRequest::Notify {
            event,
            respond_to: Some(respond_to),
        })
        .await
    }

    /// Waits until some identity is eligible and takes it in flight.
    pub async fn next_ready(&self) -> Result<WorkItem, DispatchError> {
        self.request(|respond_to| BufferRequest::NextReady { respond_to })
            .await
    }

    /// Lazy, infinite sequence of ready work items; ends when the buffer drains or closes.
    pub fn ready_items(&self) -> impl Stream<Item = WorkItem> + Send + 'static {
        futures::stream::unfold(self.clone(), |client| async move {
            client.next_ready().await.ok().map(|item| (item, client))
        })
    }

    /// Reports the outcome of an item obtained from [`next_ready`](Self::next_ready).
    pub async fn complete(
        &self,
        id: ResourceId,
        outcome: Outcome,
    ) -> Result<Completion, DispatchError> {
        self.request(|respond_to| BufferRequest::Complete {
            id,
            outcome,
            respond_to,
        })
        .await
    }

    /// Synthesizes GENERIC events for idle known identities.
    pub async fn resync(&self) -> Result<usize, DispatchError> {
        self.request(|respond_to| BufferRequest::Resync { respond_to })
            .await
    }

    pub async fn state_of(&self, id: ResourceId) -> Result<ItemState, DispatchError> {
        self.request(|respond_to| BufferRequest::State { id, respond_to })
            .await
    }

    pub async fn stats(&self) -> Result<BufferStats, DispatchError> {
        self.request(|respond_to| BufferRequest::Stats { respond_to })
            .await
    }

    /// Stops handing out work. Outcomes of in-flight items are still accepted.
    pub async fn drain(&self) -> Result<(), DispatchError> {
        self.request(|respond_to| BufferRequest::Drain { respond_to })
            .await
    }

    /// Stops the buffer actor and returns its final counters.
    pub async fn shutdown(&self) -> Result<BufferStats, DispatchError> {
        self.request(|respond_to| BufferRequest::Shutdown { respond_to })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Response<T>) -> BufferRequest,
    ) -> Result<T, DispatchError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .map_err(|_| DispatchError::BufferClosed)?;
        response.await.map_err(|_| DispatchError::BufferDropped)?
    }
}
