//! # Event Buffer Actor
//!
//! `EventBuffer` owns the [`PendingSet`] and processes requests one at a time, which is
//! what makes "at most one in-flight item per identity" hold without locks: the only
//! code that moves an identity between pending and in-flight runs on this task.
//!
//! Workers park a reply channel with `NextReady`; the actor answers as soon as an item is
//! eligible, sleeping until the earliest delayed item when nothing is ready yet.

use super::client::BufferClient;
use super::message::{BufferRequest, Response};
use super::state::{Completion, PendingSet, WorkItem};
use crate::error::DispatchError;
use crate::reconciler::Outcome;
use crate::report::ErrorReporter;
use crate::retry::RetryPolicy;
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

pub struct EventBuffer {
    receiver: mpsc::UnboundedReceiver<BufferRequest>,
    set: PendingSet,
    waiters: VecDeque<Response<WorkItem>>,
    retry: Arc<dyn RetryPolicy>,
    reporter: Arc<dyn ErrorReporter>,
    draining: bool,
}

impl EventBuffer {
    /// Creates the buffer actor and its client. The actor does nothing until
    /// [`run`](Self::run) is spawned.
    pub fn new(
        max_pending: Option<usize>,
        retry: Arc<dyn RetryPolicy>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> (Self, BufferClient) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let actor = Self {
            receiver,
            set: PendingSet::new(max_pending),
            waiters: VecDeque::new(),
            retry,
            reporter,
            draining: false,
        };
        (actor, BufferClient::new(sender))
    }

    /// Processes requests until `Shutdown` arrives or every client is dropped.
    pub async fn run(mut self) {
        info!("Event buffer started");

        loop {
            self.serve_waiters();
            let deadline = if self.waiters.is_empty() {
                None
            } else {
                self.set.next_deadline()
            };

            tokio::select! {
                msg = self.receiver.recv() => match msg {
                    Some(request) => {
                        if self.handle(request).is_break() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = sleep_until_deadline(deadline) => {}
            }
        }

        let stats = self.set.stats(Instant::now());
        info!(
            pending = stats.pending,
            delayed = stats.delayed,
            in_flight = stats.in_flight,
            given_up = stats.given_up,
            "Event buffer stopped"
        );
    }

    /// Applies one request. `Break` means the actor should stop.
    fn handle(&mut self, request: BufferRequest) -> ControlFlow<()> {
        let now = Instant::now();
        match request {
            BufferRequest::Notify { event, respond_to } => {
                let id = event.id().clone();
                let action = event.action();
                let result = self.set.add(event, now);
                match &result {
                    Ok(admission) => debug!(%id, %action, ?admission, "Buffered"),
                    Err(e) => warn!(%id, %action, error = %e, "Rejected event"),
                }
                if let Some(respond_to) = respond_to {
                    let _ = respond_to.send(result);
                }
            }
            BufferRequest::NextReady { respond_to } => {
                if self.draining {
                    let _ = respond_to.send(Err(DispatchError::Draining));
                } else {
                    self.waiters.push_back(respond_to);
                }
            }
            BufferRequest::Complete {
                id,
                outcome,
                respond_to,
            } => {
                let result = self.set.complete(&id, outcome, now, self.retry.as_ref());
                match &result {
                    Ok(Completion::Settled) => debug!(%id, "Settled"),
                    Ok(Completion::Requeued { action, delay }) => {
                        debug!(%id, %action, ?delay, "Requeued")
                    }
                    Ok(Completion::Retrying { attempt, delay }) => {
                        warn!(%id, attempt, ?delay, "Retry scheduled")
                    }
                    Ok(Completion::GaveUp(record)) => self.reporter.report(record),
                    Ok(Completion::Released) => debug!(%id, "Released back to pending"),
                    Err(e) => warn!(%id, error = %e, "Completion ignored"),
                }
                let _ = respond_to.send(result);
            }
            BufferRequest::Resync { respond_to } => {
                let queued = self.set.resync(now);
                debug!(queued, "Resync");
                let _ = respond_to.send(Ok(queued));
            }
            BufferRequest::State { id, respond_to } => {
                let _ = respond_to.send(Ok(self.set.state_of(&id, now)));
            }
            BufferRequest::Stats { respond_to } => {
                let _ = respond_to.send(Ok(self.set.stats(now)));
            }
            BufferRequest::Drain { respond_to } => {
                self.draining = true;
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(Err(DispatchError::Draining));
                }
                info!(tracked = self.set.len(), "Draining");
                let _ = respond_to.send(Ok(()));
            }
            BufferRequest::Shutdown { respond_to } => {
                let _ = respond_to.send(Ok(self.set.stats(now)));
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Hands eligible items to parked workers, oldest waiter first.
    fn serve_waiters(&mut self) {
        let now = Instant::now();
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.is_closed() {
                continue;
            }
            let Some(item) = self.set.pop_ready(now) else {
                self.waiters.push_front(waiter);
                break;
            };
            debug!(id = %item.id, action = %item.action, attempt = item.attempt, "Dispatching");
            if let Err(Ok(item)) = waiter.send(Ok(item)) {
                // Receiver went away between the check and the send.
                let _ = self
                    .set
                    .complete(&item.id, Outcome::Aborted, now, self.retry.as_ref());
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
