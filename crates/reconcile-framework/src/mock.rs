//! # Mock Reconciler & Testing Guide
//!
//! `MockReconciler` implements [`Reconciler`] with scripted responses, so dispatcher
//! behaviour (coalescing, retries, give-ups, shutdown) can be tested without any real
//! business logic.
//!
//! ## What it gives you
//!
//! | Feature | How |
//! |---------|-----|
//! | **Scripted outcomes** | `expect(id).return_ok(..)` / `.return_err(..)`, consumed in order per id |
//! | **Mid-flight control** | `.wait_on(&gate)` holds the call until `gate.release()` |
//! | **Panic injection** | `.panic()` |
//! | **Slow calls** | `set_latency(d)` |
//! | **Call log** | `calls()`, `calls_for(id)`, `wait_for_calls(n)` |
//! | **Overlap detection** | `max_concurrent_per_id()` is the highest number of simultaneous calls seen for one id |
//!
//! Calls without a queued expectation return the default response (`Done` unless changed
//! with [`MockReconciler::set_default`]).
//!
//! ## Example
//!
//! ```rust
//! use reconcile_framework::mock::MockReconciler;
//! use reconcile_framework::{
//!     Dispatcher, DispatcherConfig, ReconcileAction, ResourceAction, ResourceEvent, ResourceId,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let id = ResourceId::namespaced("Pod", "default", "web");
//!     let mock = MockReconciler::new();
//!     mock.expect(id.clone()).return_ok(ReconcileAction::Done);
//!
//!     let handle = Dispatcher::new(DispatcherConfig::default(), mock.clone())
//!         .start(())
//!         .unwrap();
//!     handle.notify(ResourceEvent::added(id.clone())).unwrap();
//!
//!     mock.wait_for_calls(1).await;
//!     assert_eq!(mock.calls_for(&id), vec![ResourceAction::Added]);
//!     handle.shutdown().await.unwrap();
//!     mock.verify();
//! }
//! ```
//!
//! ## Holding a reconciliation mid-flight
//!
//! ```rust,ignore
//! let gate = Gate::new();
//! mock.expect(id.clone()).wait_on(&gate).return_ok(ReconcileAction::Done);
//! handle.notify(ResourceEvent::added(id.clone()))?;
//! gate.entered().await;            // the reconciler is now running for `id`
//! handle.notify(ResourceEvent::deleted(id.clone()))?;   // becomes pending-next
//! gate.release();
//! ```

use crate::error::ReconcileError;
use crate::reconciler::{ReconcileAction, Reconciler};
use crate::report::{ErrorReporter, GiveUpRecord};
use crate::resource::{ResourceAction, ResourceId};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

type Response = Result<ReconcileAction, ReconcileError>;

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

enum Expectation {
    Respond {
        gate: Option<Arc<Gate>>,
        response: Response,
    },
    Panic,
}

/// A recorded reconcile call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub id: ResourceId,
    pub action: ResourceAction,
    pub started: Instant,
}

/// Holds a scripted call until released.
#[derive(Debug, Default)]
pub struct Gate {
    entered: Notify,
    released: Notify,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Resolves once the gated call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Lets the gated call return its response.
    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[derive(Default)]
struct MockState {
    expectations: Mutex<HashMap<ResourceId, VecDeque<Expectation>>>,
    default: Mutex<Option<Response>>,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<Vec<Call>>,
    active: Mutex<HashMap<ResourceId, usize>>,
    max_concurrent: Mutex<usize>,
    call_started: Notify,
}

/// Decrements the active count even if the call panics or is aborted.
struct ActiveGuard<'a> {
    state: &'a MockState,
    id: ResourceId,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.state.active.lock().unwrap();
        if let Some(count) = active.get_mut(&self.id) {
            *count = count.saturating_sub(1);
        }
    }
}

/// A scripted [`Reconciler`]. Clones share the same script and call log.
#[derive(Clone, Default)]
pub struct MockReconciler {
    state: Arc<MockState>,
}

impl MockReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for the next call on `id`.
    pub fn expect(&self, id: ResourceId) -> ExpectationBuilder {
        ExpectationBuilder {
            id,
            gate: None,
            state: Arc::clone(&self.state),
        }
    }

    /// Response for calls with no queued expectation.
    pub fn set_default(&self, response: Response) {
        *self.state.default.lock().unwrap() = Some(response);
    }

    /// Makes every call take at least `latency` before responding.
    pub fn set_latency(&self, latency: Duration) {
        *self.state.latency.lock().unwrap() = Some(latency);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Actions seen for one id, in call order.
    pub fn calls_for(&self, id: &ResourceId) -> Vec<ResourceAction> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| &call.id == id)
            .map(|call| call.action)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().unwrap().len()
    }

    /// Highest number of overlapping calls observed for a single id.
    pub fn max_concurrent_per_id(&self) -> usize {
        *self.state.max_concurrent.lock().unwrap()
    }

    /// Resolves once at least `n` calls have started.
    pub async fn wait_for_calls(&self, n: usize) {
        loop {
            let started = self.state.call_started.notified();
            if self.call_count() >= n {
                return;
            }
            started.await;
        }
    }

    /// Verifies that all expectations were consumed.
    pub fn verify(&self) {
        let exps = self.state.expectations.lock().unwrap();
        let remaining: usize = exps.values().map(VecDeque::len).sum();
        if remaining > 0 {
            panic!("Not all expectations were met. {} remaining", remaining);
        }
    }
}

#[async_trait]
impl Reconciler for MockReconciler {
    type Context = ();

    async fn reconcile(
        &self,
        id: &ResourceId,
        action: ResourceAction,
        _ctx: &(),
    ) -> Result<ReconcileAction, ReconcileError> {
        let state = self.state.as_ref();
        {
            let mut active = state.active.lock().unwrap();
            let count = active.entry(id.clone()).or_insert(0);
            *count += 1;
            let mut max = state.max_concurrent.lock().unwrap();
            *max = (*max).max(*count);
        }
        let _guard = ActiveGuard {
            state,
            id: id.clone(),
        };
        state.calls.lock().unwrap().push(Call {
            id: id.clone(),
            action,
            started: Instant::now(),
        });
        state.call_started.notify_waiters();

        let latency = *state.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let expectation = state
            .expectations
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front);

        match expectation {
            Some(Expectation::Respond { gate, response }) => {
                if let Some(gate) = gate {
                    gate.entered.notify_one();
                    gate.released.notified().await;
                }
                response
            }
            Some(Expectation::Panic) => panic!("scripted reconciler panic for {id}"),
            None => state
                .default
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Ok(ReconcileAction::Done)),
        }
    }
}

/// Builder for one scripted call.
pub struct ExpectationBuilder {
    id: ResourceId,
    gate: Option<Arc<Gate>>,
    state: Arc<MockState>,
}

impl ExpectationBuilder {
    /// Holds the call until `gate.release()`.
    pub fn wait_on(mut self, gate: &Arc<Gate>) -> Self {
        self.gate = Some(Arc::clone(gate));
        self
    }

    /// Sets the expectation to return a successful result.
    pub fn return_ok(self, action: ReconcileAction) {
        self.push(Expectation::Respond {
            gate: self.gate.clone(),
            response: Ok(action),
        });
    }

    /// Sets the expectation to return an error.
    pub fn return_err(self, error: ReconcileError) {
        self.push(Expectation::Respond {
            gate: self.gate.clone(),
            response: Err(error),
        });
    }

    /// Sets the expectation to panic inside the reconciler.
    pub fn panic(self) {
        self.push(Expectation::Panic);
    }

    fn push(&self, expectation: Expectation) {
        let mut exps = self.state.expectations.lock().unwrap();
        exps.entry(self.id.clone()).or_default().push_back(expectation);
    }
}

/// An [`ErrorReporter`] that keeps every record for later assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    records: Arc<Mutex<Vec<GiveUpRecord>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<GiveUpRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, record: &GiveUpRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}
