//! # Reconcile Sample
//!
//! A runnable mirror controller on top of `reconcile_framework`.
//!
//! ## 🚀 Core Components
//!
//! - **`model`**: [`ConfigEntry`](reconcile_sample::model::ConfigEntry) and the shared
//!   [`Store`](reconcile_sample::model::Store) tables.
//! - **`watcher`**: a simulated informer that writes desired state and emits events.
//! - **`reconciler`**: the level-based [`MirrorReconciler`](reconcile_sample::reconciler::MirrorReconciler).
//! - **`lifecycle`**: [`ControllerSystem`], which wires and stops everything.
//!
//! ## 📚 Quick Start
//!
//! ```bash
//! RUST_LOG=info cargo run -p reconcile-sample -- crates/reconcile-sample/reconcile.toml
//! ```
//!
//! Without an argument the built-in defaults and demo script are used.

use reconcile_framework::tracing::setup_tracing;
use reconcile_sample::config::SampleConfig;
use reconcile_sample::lifecycle::ControllerSystem;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!(%path, "Loading configuration");
            SampleConfig::from_file(&path).map_err(|e| e.to_string())?
        }
        None => SampleConfig::default(),
    };
    let script = config.script.clone();
    let interval = config.watcher.event_interval();

    info!(steps = script.len(), "Starting mirror controller");
    let mut system = ControllerSystem::new(config).map_err(|e| e.to_string())?;

    let span = tracing::info_span!("watch_replay");
    system
        .watcher
        .replay(&script, interval)
        .instrument(span)
        .await
        .map_err(|e| e.to_string())?;

    if !system
        .wait_until_idle(Duration::from_secs(30))
        .await
        .map_err(|e| e.to_string())?
    {
        warn!("Continuing shutdown with work still queued");
    }

    // A relist must not change anything once the mirror has converged.
    system.watcher.relist().map_err(|e| e.to_string())?;
    system
        .wait_until_idle(Duration::from_secs(5))
        .await
        .map_err(|e| e.to_string())?;

    for record in system.take_alerts() {
        error!(
            id = %record.id,
            attempts = record.attempts,
            reason = %record.reason,
            "Needs operator attention"
        );
    }
    for entry in system.mirror.snapshot() {
        info!(id = %entry.id, generation = entry.generation, "Mirrored entry");
    }

    let report = system.shutdown().await.map_err(|e| e.to_string())?;
    info!(
        drained = report.drained,
        pending = report.stats.pending,
        "Application completed successfully"
    );
    Ok(())
}
