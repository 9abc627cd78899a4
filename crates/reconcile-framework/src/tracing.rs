//! # Observability & Tracing
//!
//! Every component logs through `tracing` with structured fields. Call [`setup_tracing`]
//! once at startup to print them.
//!
//! ## What Gets Traced
//!
//! - **Lifecycle**: buffer/dispatcher start, drain and shutdown (`info`)
//! - **Item flow**: buffered, coalesced, dispatched, settled, requeued (`debug`)
//! - **Retries & overflow**: scheduled retries and rejected events (`warn`)
//! - **Give-ups**: one line per identity that stops being retried (`error`)
//!
//! Each reconcile call runs inside a `reconcile` span carrying `worker`, `id`, `action`
//! and `attempt`, so the reconciler's own logs inherit that context.
//!
//! ```text
//! INFO Dispatcher started workers=4 resync=true
//! INFO reconcile:Reconciled worker=0 id=ConfigMap/default/app action=ADDED attempt=0
//! WARN Retry scheduled id=ConfigMap/default/db attempt=1 delay=1s
//! ```
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run -p reconcile-sample
//! RUST_LOG=reconcile_framework=debug cargo run -p reconcile-sample
//! ```

/// Installs a compact fmt subscriber filtered by `RUST_LOG`.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
