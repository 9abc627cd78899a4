//! # Dispatcher
//!
//! Wires an [`EventBuffer`] to a fixed pool of worker tasks and a [`Reconciler`].
//!
//! ```text
//! watchers ──notify()──► EventBuffer ──next_ready()──► worker 0..N ──► Reconciler
//!                            ▲                             │
//!                            └──────── complete(outcome) ──┘
//! ```
//!
//! Each worker loops: take the next ready [`WorkItem`] (the buffer marks it in flight),
//! run the reconciler on it in its own task, and report the [`Outcome`]. Because only the
//! buffer moves identities in and out of flight, two workers never hold the same
//! identity, and events arriving meanwhile only set the pending-next marker.
//!
//! # Usage
//!
//! ```rust
//! use async_trait::async_trait;
//! use reconcile_framework::{
//!     Dispatcher, DispatcherConfig, ReconcileAction, ReconcileError, Reconciler,
//!     ResourceAction, ResourceEvent, ResourceId,
//! };
//!
//! struct Noop;
//!
//! #[async_trait]
//! impl Reconciler for Noop {
//!     type Context = ();
//!     async fn reconcile(
//!         &self,
//!         _id: &ResourceId,
//!         _action: ResourceAction,
//!         _ctx: &(),
//!     ) -> Result<ReconcileAction, ReconcileError> {
//!         Ok(ReconcileAction::Done)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handle = Dispatcher::new(DispatcherConfig::default(), Noop).start(())?;
//!     handle.notify(ResourceEvent::added(ResourceId::cluster_scoped("Node", "n1")))?;
//!     handle.shutdown().await?;
//!     Ok(())
//! }
//! ```

use crate::buffer::{BufferClient, BufferStats, EventBuffer, WorkItem};
use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::reconciler::{Outcome, Reconciler};
use crate::report::{ErrorReporter, TracingReporter};
use crate::resource::ResourceEvent;
use crate::retry::{ExponentialBackoff, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Builder for a running dispatcher.
pub struct Dispatcher<R: Reconciler> {
    config: DispatcherConfig,
    reconciler: Arc<R>,
    retry: Arc<dyn RetryPolicy>,
    reporter: Arc<dyn ErrorReporter>,
}

impl<R: Reconciler> Dispatcher<R> {
    /// Uses [`ExponentialBackoff`] from `config` and logs give-ups via [`TracingReporter`].
    pub fn new(config: DispatcherConfig, reconciler: R) -> Self {
        let retry = Arc::new(ExponentialBackoff::from_config(&config));
        Self {
            config,
            reconciler: Arc::new(reconciler),
            retry,
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_retry_policy(mut self, policy: impl RetryPolicy) -> Self {
        self.retry = Arc::new(policy);
        self
    }

    pub fn with_reporter(mut self, reporter: impl ErrorReporter) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Spawns the buffer actor, the worker pool and (if configured) the resync ticker.
    ///
    /// `context` is shared by every reconcile call.
    pub fn start(self, context: R::Context) -> Result<DispatcherHandle, DispatchError> {
        self.config.validate()?;

        let (buffer, client) = EventBuffer::new(self.config.max_pending, self.retry, self.reporter);
        let buffer_task = tokio::spawn(buffer.run());

        let (stop, stop_rx) = watch::channel(false);
        let (abort, abort_rx) = watch::channel(false);
        let context = Arc::new(context);

        let workers = (0..self.config.worker_count)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    client.clone(),
                    Arc::clone(&self.reconciler),
                    Arc::clone(&context),
                    abort_rx.clone(),
                ))
            })
            .collect();

        let resync = self
            .config
            .resync_period()
            .map(|period| tokio::spawn(resync_loop(client.clone(), period, stop_rx)));

        info!(
            workers = self.config.worker_count,
            resync = resync.is_some(),
            "Dispatcher started"
        );

        Ok(DispatcherHandle {
            client,
            workers,
            buffer_task,
            resync,
            stop,
            abort,
            drain_timeout: self.config.drain_timeout(),
        })
    }
}

/// Summary returned by [`DispatcherHandle::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// `true` if every in-flight reconciliation finished within the drain timeout.
    pub drained: bool,
    /// Reconciliations cut short after the timeout; their items went back to pending.
    pub aborted: usize,
    pub stats: BufferStats,
}

/// A running dispatcher. Call [`shutdown`](Self::shutdown) to stop it.
pub struct DispatcherHandle {
    client: BufferClient,
    workers: Vec<JoinHandle<usize>>,
    buffer_task: JoinHandle<()>,
    resync: Option<JoinHandle<()>>,
    stop: watch::Sender<bool>,
    abort: watch::Sender<bool>,
    drain_timeout: Duration,
}

impl DispatcherHandle {
    /// A client to inject into watchers.
    pub fn client(&self) -> BufferClient {
        self.client.clone()
    }

    pub fn notify(&self, event: ResourceEvent) -> Result<(), DispatchError> {
        self.client.notify(event)
    }

    /// Gracefully stops the dispatcher.
    ///
    /// 1. Stops the resync ticker.
    /// 2. Closes worker intake; idle workers exit.
    /// 3. Waits up to the drain timeout for in-flight reconciliations, then aborts the
    ///    rest (their items return to pending).
    /// 4. Stops the buffer actor.
    pub async fn shutdown(self) -> Result<ShutdownReport, DispatchError> {
        info!("Shutting down dispatcher...");
        let _ = self.stop.send(true);
        let mut failure = None;

        if let Some(resync) = self.resync {
            if let Err(e) = resync.await {
                failure.get_or_insert(DispatchError::WorkerPanicked(e.to_string()));
            }
        }

        self.client.drain().await?;

        let deadline = Instant::now() + self.drain_timeout;
        let mut drained = true;
        let mut aborted = 0;
        for mut worker in self.workers {
            if drained {
                if let Ok(joined) = timeout_at(deadline, &mut worker).await {
                    match joined {
                        Ok(count) => aborted += count,
                        Err(e) => {
                            failure.get_or_insert(DispatchError::WorkerPanicked(e.to_string()));
                        }
                    }
                    continue;
                }
                warn!(timeout = ?self.drain_timeout, "Drain timed out, aborting in-flight work");
                drained = false;
                let _ = self.abort.send(true);
            }
            match worker.await {
                Ok(count) => aborted += count,
                Err(e) => {
                    failure.get_or_insert(DispatchError::WorkerPanicked(e.to_string()));
                }
            }
        }

        let stats = self.client.shutdown().await?;
        if let Err(e) = self.buffer_task.await {
            error!("Event buffer task failed: {:?}", e);
            failure.get_or_insert(DispatchError::WorkerPanicked(e.to_string()));
        }

        if let Some(e) = failure {
            return Err(e);
        }
        info!(drained, aborted, "Dispatcher shutdown complete.");
        Ok(ShutdownReport {
            drained,
            aborted,
            stats,
        })
    }
}

/// Pulls work until the buffer drains. Returns how many items were aborted.
async fn worker_loop<R: Reconciler>(
    worker: usize,
    client: BufferClient,
    reconciler: Arc<R>,
    context: Arc<R::Context>,
    mut abort: watch::Receiver<bool>,
) -> usize {
    debug!(worker, "Worker started");
    let mut aborted = 0;

    while let Ok(item) = client.next_ready().await {
        let span = info_span!(
            "reconcile",
            worker,
            id = %item.id,
            action = %item.action,
            attempt = item.attempt
        );
        let outcome = reconcile_once(&item, &reconciler, &context, &mut abort)
            .instrument(span)
            .await;
        if outcome == Outcome::Aborted {
            aborted += 1;
        }
        if let Err(e) = client.complete(item.id, outcome).await {
            warn!(worker, error = %e, "Could not record outcome");
            break;
        }
    }

    debug!(worker, "Worker stopped");
    aborted
}

/// Runs one reconcile call in its own task so a panic is seen as a failure.
async fn reconcile_once<R: Reconciler>(
    item: &WorkItem,
    reconciler: &Arc<R>,
    context: &Arc<R::Context>,
    abort: &mut watch::Receiver<bool>,
) -> Outcome {
    let id = item.id.clone();
    let action = item.action;
    let reconciler = Arc::clone(reconciler);
    let context = Arc::clone(context);
    let mut task =
        tokio::spawn(async move { reconciler.reconcile(&id, action, &context).await });

    debug!("Reconciling");
    let outcome = tokio::select! {
        joined = &mut task => match joined {
            Ok(result) => Outcome::from(result),
            Err(e) if e.is_panic() => Outcome::Failure(format!("reconciler panicked: {e}")),
            Err(e) => Outcome::Failure(e.to_string()),
        },
        _ = wait_for_abort(abort) => {
            task.abort();
            Outcome::Aborted
        }
    };

    match &outcome {
        Outcome::Success => info!("Reconciled"),
        Outcome::Requeue(delay) => info!(?delay, "Reconciled, requeue requested"),
        Outcome::Failure(e) => warn!(error = %e, "Reconcile failed"),
        Outcome::Fatal(e) => error!(error = %e, "Reconcile failed permanently"),
        Outcome::Aborted => warn!("Reconcile aborted by shutdown"),
    }
    outcome
}

async fn wait_for_abort(abort: &mut watch::Receiver<bool>) {
    let signalled = abort.wait_for(|aborted| *aborted).await.is_ok();
    if !signalled {
        // Sender gone without aborting: never fire.
        std::future::pending::<()>().await;
    }
}

async fn resync_loop(client: BufferClient, period: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(?period, "Resync ticker started");

    loop {
        tokio::select! {
            _ = ticker.tick() => match client.resync().await {
                Ok(queued) => debug!(queued, "Periodic resync"),
                Err(e) => {
                    warn!(error = %e, "Resync stopped");
                    break;
                }
            },
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
}
