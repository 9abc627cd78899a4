//! # Controller Lifecycle
//!
//! [`ControllerSystem`] is the conductor of the sample: it builds the stores, starts the
//! dispatcher with the [`MirrorReconciler`], injects the buffer client into the watcher
//! and tears everything down in order.
//!
//! ```rust,ignore
//! let system = ControllerSystem::new(SampleConfig::default())?;
//! system.watcher.apply("app", data, None)?;
//! system.wait_until_idle(Duration::from_secs(5)).await?;
//! let report = system.shutdown().await?;
//! ```
//!
//! ## Wiring
//!
//! 1. **Stores** - desired state (written by the watcher) and the mirror (written by
//!    the reconciler) are created first and shared through [`MirrorContext`].
//! 2. **Dispatcher** - started with the context; give-ups are forwarded to an alert
//!    channel instead of only being logged.
//! 3. **Watcher** - receives a clone of the [`BufferClient`](reconcile_framework::BufferClient).
//!    Nothing is global, so tests can build as many systems as they like.
//!
//! ## Graceful Shutdown
//!
//! [`ControllerSystem::shutdown`] delegates to
//! [`DispatcherHandle::shutdown`](reconcile_framework::DispatcherHandle::shutdown): intake
//! closes, running reconciliations get the configured drain timeout, and the buffer
//! stops last.

use crate::config::{SampleConfig, SampleError};
use crate::model::Store;
use crate::reconciler::{MirrorContext, MirrorReconciler};
use crate::watcher::SimulatedWatcher;
use reconcile_framework::{
    BufferStats, Dispatcher, DispatcherHandle, GiveUpRecord, ShutdownReport,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

const IDLE_POLL: Duration = Duration::from_millis(20);

pub struct ControllerSystem {
    pub watcher: SimulatedWatcher,
    pub desired: Store,
    pub mirror: Store,
    handle: DispatcherHandle,
    alerts: mpsc::UnboundedReceiver<GiveUpRecord>,
}

impl ControllerSystem {
    /// Starts the dispatcher and wires the watcher to it. Must be called inside a Tokio
    /// runtime.
    pub fn new(config: SampleConfig) -> Result<Self, SampleError> {
        let desired = Store::new();
        let mirror = Store::new();
        let context = MirrorContext {
            desired: desired.clone(),
            mirror: mirror.clone(),
        };

        let (alert_tx, alerts) = mpsc::unbounded_channel();
        let reconciler = MirrorReconciler::new(config.watcher.flaky_failures);
        let handle = Dispatcher::new(config.dispatcher, reconciler)
            .with_reporter(alert_tx)
            .start(context)?;

        let watcher = SimulatedWatcher::new(
            handle.client(),
            desired.clone(),
            config.watcher.kind,
            config.watcher.namespace,
        );
        info!("Controller system started");

        Ok(Self {
            watcher,
            desired,
            mirror,
            handle,
            alerts,
        })
    }

    pub async fn stats(&self) -> Result<BufferStats, SampleError> {
        Ok(self.handle.client().stats().await?)
    }

    /// Waits until nothing is pending, delayed or in flight. Returns `false` on timeout.
    pub async fn wait_until_idle(&self, limit: Duration) -> Result<bool, SampleError> {
        let deadline = Instant::now() + limit;
        loop {
            let stats = self.stats().await?;
            if stats.pending + stats.delayed + stats.in_flight == 0 {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                warn!(?stats, "Controller did not settle in time");
                return Ok(false);
            }
            sleep(IDLE_POLL).await;
        }
    }

    /// Give-ups reported since the last call.
    pub fn take_alerts(&mut self) -> Vec<GiveUpRecord> {
        let mut records = Vec::new();
        while let Ok(record) = self.alerts.try_recv() {
            records.push(record);
        }
        records
    }

    pub async fn shutdown(self) -> Result<ShutdownReport, SampleError> {
        info!("Shutting down controller system...");
        let report = self.handle.shutdown().await?;
        info!(
            drained = report.drained,
            aborted = report.aborted,
            "Controller system stopped"
        );
        Ok(report)
    }
}
