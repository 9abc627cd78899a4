//! # Pending Set
//!
//! The synchronous state machine behind the event buffer. It tracks, per identity,
//! either one pending work item (waiting for its eligible time) or one in-flight item
//! (handed to a worker), never both. The [`EventBuffer`](super::EventBuffer) actor owns
//! the only instance, so no locking is needed here.
//!
//! ```text
//!            add()                pop_ready()              complete(Success)
//!   (none) ────────► Pending ───────────────► InFlight ─────────────────────► (none)
//!                      ▲  ▲                     │  │ add() => pending_next
//!                      │  └─── Failure/Requeue ─┘  │
//!                      └──── Success + pending_next┘
//! ```

use crate::error::{DispatchError, GiveUpReason};
use crate::reconciler::Outcome;
use crate::report::GiveUpRecord;
use crate::resource::{ResourceAction, ResourceEvent, ResourceId};
use crate::retry::RetryPolicy;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// A unit of reconciliation work handed to exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: ResourceId,
    /// The coalesced action for this dispatch.
    pub action: ResourceAction,
    /// Failures recorded so far for this item.
    pub attempt: u32,
    pub eligible_at: Instant,
}

/// How an added event was absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A new pending item was created.
    Queued,
    /// Merged into an existing pending item; carries the merged action.
    Coalesced(ResourceAction),
    /// The identity is in flight; recorded as pending-next with the merged action.
    Deferred(ResourceAction),
}

/// What happened to an in-flight item when its outcome was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// No more work for this identity.
    Settled,
    /// Queued again, either immediately (pending-next) or after a requested delay.
    Requeued {
        action: ResourceAction,
        delay: Duration,
    },
    /// Scheduled for another attempt after a failure.
    Retrying { attempt: u32, delay: Duration },
    GaveUp(GiveUpRecord),
    /// Returned to pending unchanged (shutdown abort).
    Released,
}

/// Externally observable state of one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemState {
    Absent,
    Pending {
        action: ResourceAction,
        attempt: u32,
    },
    Delayed {
        action: ResourceAction,
        attempt: u32,
        remaining: Duration,
    },
    InFlight {
        action: ResourceAction,
        attempt: u32,
        pending_next: Option<ResourceAction>,
    },
    GivenUp(GiveUpRecord),
}

/// Point-in-time counters for the buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub pending: usize,
    pub delayed: usize,
    pub in_flight: usize,
    pub given_up: usize,
    pub known: usize,
    pub rejected: u64,
    /// Resync-only items dropped to admit a real change.
    pub evicted: u64,
}

type QueueKey = (Instant, u64);

/// Stand-in for "never" when a delay does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[derive(Debug)]
enum Slot {
    Pending {
        action: ResourceAction,
        attempt: u32,
        key: QueueKey,
    },
    InFlight {
        action: ResourceAction,
        attempt: u32,
        pending_next: Option<ResourceAction>,
    },
}

/// Per-identity coalescing state.
#[derive(Debug, Default)]
pub struct PendingSet {
    slots: HashMap<ResourceId, Slot>,
    /// Pending items ordered by eligible time, then arrival.
    queue: BTreeMap<QueueKey, ResourceId>,
    /// Identities seen alive; resync synthesizes GENERIC events for these.
    known: BTreeSet<ResourceId>,
    given_up: HashMap<ResourceId, GiveUpRecord>,
    max_pending: Option<usize>,
    seq: u64,
    rejected: u64,
    evicted: u64,
}

impl PendingSet {
    pub fn new(max_pending: Option<usize>) -> Self {
        Self {
            max_pending,
            ..Self::default()
        }
    }

    /// Number of tracked identities (pending + in flight).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Inserts or coalesces an event.
    ///
    /// An admitted event clears any give-up record for its identity; a rejected one
    /// leaves it in place.
    pub fn add(&mut self, event: ResourceEvent, now: Instant) -> Result<Admission, DispatchError> {
        let (id, action) = event.into_parts();
        let admission = self.admit(&id, action, now)?;
        self.given_up.remove(&id);
        Ok(admission)
    }

    fn admit(
        &mut self,
        id: &ResourceId,
        action: ResourceAction,
        now: Instant,
    ) -> Result<Admission, DispatchError> {
        match self.slots.get_mut(id) {
            Some(Slot::InFlight { pending_next, .. }) => {
                let merged = pending_next.map_or(action, |prev| prev.coalesce(action));
                *pending_next = Some(merged);
                self.remember(id, action);
                return Ok(Admission::Deferred(merged));
            }
            Some(Slot::Pending {
                action: pending,
                key,
                ..
            }) => {
                let merged = pending.coalesce(action);
                *pending = merged;
                // A real change cuts a retry/requeue delay short; a resync does not.
                if action.is_specific() && key.0 > now {
                    let stale = *key;
                    self.queue.remove(&stale);
                    let fresh = (now, self.seq);
                    self.seq = self.seq.wrapping_add(1);
                    self.queue.insert(fresh, id.clone());
                    *key = fresh;
                }
                self.remember(id, action);
                return Ok(Admission::Coalesced(merged));
            }
            None => {}
        }

        if self.at_capacity() {
            self.make_room(id, action)?;
        }
        self.remember(id, action);
        self.schedule(id.clone(), action, 0, now);
        Ok(Admission::Queued)
    }

    /// Moves the earliest eligible pending item to in-flight.
    pub fn pop_ready(&mut self, now: Instant) -> Option<WorkItem> {
        let key = *self.queue.keys().next()?;
        if key.0 > now {
            return None;
        }
        let id = self.queue.remove(&key)?;
        let slot = self.slots.get_mut(&id)?;
        match *slot {
            Slot::Pending {
                action, attempt, ..
            } => {
                *slot = Slot::InFlight {
                    action,
                    attempt,
                    pending_next: None,
                };
                Some(WorkItem {
                    id,
                    action,
                    attempt,
                    eligible_at: key.0,
                })
            }
            Slot::InFlight { .. } => None,
        }
    }

    /// Earliest eligible time among pending items.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|key| key.0)
    }

    /// Records the outcome of an in-flight item.
    pub fn complete(
        &mut self,
        id: &ResourceId,
        outcome: Outcome,
        now: Instant,
        policy: &dyn RetryPolicy,
    ) -> Result<Completion, DispatchError> {
        let (action, attempt, pending_next) = match self.slots.get(id) {
            Some(Slot::InFlight {
                action,
                attempt,
                pending_next,
            }) => (*action, *attempt, *pending_next),
            _ => return Err(DispatchError::NotInFlight(id.clone())),
        };

        let completion = match outcome {
            Outcome::Success => match pending_next {
                Some(next) => {
                    self.schedule(id.clone(), next, 0, now);
                    Completion::Requeued {
                        action: next,
                        delay: Duration::ZERO,
                    }
                }
                None => {
                    self.slots.remove(id);
                    Completion::Settled
                }
            },
            Outcome::Requeue(requested) => match pending_next {
                Some(next) if next.is_specific() => {
                    self.schedule(id.clone(), next, 0, now);
                    Completion::Requeued {
                        action: next,
                        delay: Duration::ZERO,
                    }
                }
                // A resync never shortens the requested wait.
                _ => {
                    let delay = policy.requeue_delay(requested);
                    self.schedule(id.clone(), action, 0, deadline(now, delay));
                    Completion::Requeued { action, delay }
                }
            },
            Outcome::Failure(error) => {
                let attempt = attempt.saturating_add(1);
                if policy.should_give_up(attempt) {
                    let reason = GiveUpReason::RetriesExhausted { last_error: error };
                    self.give_up(id, action, attempt, reason, pending_next, now)
                } else {
                    let retry_action = pending_next.map_or(action, |next| action.coalesce(next));
                    let delay = if pending_next.is_some_and(ResourceAction::is_specific) {
                        Duration::ZERO
                    } else {
                        policy.next_delay(attempt)
                    };
                    self.schedule(id.clone(), retry_action, attempt, deadline(now, delay));
                    Completion::Retrying { attempt, delay }
                }
            }
            Outcome::Fatal(error) => {
                let reason = GiveUpReason::Permanent { error };
                self.give_up(
                    id,
                    action,
                    attempt.saturating_add(1),
                    reason,
                    pending_next,
                    now,
                )
            }
            Outcome::Aborted => {
                let retry_action = pending_next.map_or(action, |next| action.coalesce(next));
                self.schedule(id.clone(), retry_action, attempt, now);
                Completion::Released
            }
        };
        Ok(completion)
    }

    /// Queues a GENERIC item for every known identity that is idle. Returns how many
    /// were queued; identities skipped because the buffer is full count as rejected.
    pub fn resync(&mut self, now: Instant) -> usize {
        let idle: Vec<ResourceId> = self
            .known
            .iter()
            .filter(|id| !self.slots.contains_key(*id) && !self.given_up.contains_key(*id))
            .cloned()
            .collect();
        let total = idle.len();
        let mut queued = 0;
        for id in idle {
            if self.at_capacity() {
                break;
            }
            self.schedule(id, ResourceAction::Generic, 0, now);
            queued += 1;
        }
        let skipped = u64::try_from(total - queued).unwrap_or(u64::MAX);
        self.rejected = self.rejected.saturating_add(skipped);
        queued
    }

    pub fn state_of(&self, id: &ResourceId, now: Instant) -> ItemState {
        match self.slots.get(id) {
            Some(Slot::Pending {
                action,
                attempt,
                key,
            }) if key.0 > now => ItemState::Delayed {
                action: *action,
                attempt: *attempt,
                remaining: key.0 - now,
            },
            Some(Slot::Pending {
                action, attempt, ..
            }) => ItemState::Pending {
                action: *action,
                attempt: *attempt,
            },
            Some(Slot::InFlight {
                action,
                attempt,
                pending_next,
            }) => ItemState::InFlight {
                action: *action,
                attempt: *attempt,
                pending_next: *pending_next,
            },
            None => self
                .given_up
                .get(id)
                .cloned()
                .map_or(ItemState::Absent, ItemState::GivenUp),
        }
    }

    pub fn stats(&self, now: Instant) -> BufferStats {
        let mut stats = BufferStats {
            given_up: self.given_up.len(),
            known: self.known.len(),
            rejected: self.rejected,
            evicted: self.evicted,
            ..BufferStats::default()
        };
        for slot in self.slots.values() {
            match slot {
                Slot::Pending { key, .. } if key.0 > now => stats.delayed += 1,
                Slot::Pending { .. } => stats.pending += 1,
                Slot::InFlight { .. } => stats.in_flight += 1,
            }
        }
        stats
    }

    fn schedule(&mut self, id: ResourceId, action: ResourceAction, attempt: u32, at: Instant) {
        let key = (at, self.seq);
        self.seq = self.seq.wrapping_add(1);
        self.queue.insert(key, id.clone());
        self.slots.insert(
            id,
            Slot::Pending {
                action,
                attempt,
                key,
            },
        );
    }

    fn give_up(
        &mut self,
        id: &ResourceId,
        action: ResourceAction,
        attempts: u32,
        reason: GiveUpReason,
        pending_next: Option<ResourceAction>,
        now: Instant,
    ) -> Completion {
        self.slots.remove(id);
        let record = GiveUpRecord {
            id: id.clone(),
            action,
            attempts,
            reason,
        };
        self.given_up.insert(id.clone(), record.clone());
        // An event that arrived during the last attempt is a new observation.
        if let Some(next) = pending_next {
            self.schedule(id.clone(), next, 0, now);
        }
        Completion::GaveUp(record)
    }

    fn remember(&mut self, id: &ResourceId, action: ResourceAction) {
        match action {
            ResourceAction::Added | ResourceAction::Updated => {
                self.known.insert(id.clone());
            }
            ResourceAction::Deleted => {
                self.known.remove(id);
            }
            ResourceAction::Generic => {}
        }
    }

    fn at_capacity(&self) -> bool {
        self.max_pending
            .is_some_and(|bound| self.slots.len() >= bound)
    }

    /// Frees a slot for a new identity, or rejects it. DELETED is always admitted;
    /// GENERIC is rejected outright; ADDED/UPDATED evict one resync-only item.
    fn make_room(&mut self, id: &ResourceId, action: ResourceAction) -> Result<(), DispatchError> {
        let victim = match action {
            ResourceAction::Deleted => return Ok(()),
            ResourceAction::Generic => None,
            ResourceAction::Added | ResourceAction::Updated => self
                .queue
                .iter()
                .find(|(_, candidate)| {
                    matches!(
                        self.slots.get(*candidate),
                        Some(Slot::Pending {
                            action: ResourceAction::Generic,
                            attempt: 0,
                            ..
                        })
                    )
                })
                .map(|(key, candidate)| (*key, candidate.clone())),
        };

        match victim {
            Some((key, evicted)) => {
                self.queue.remove(&key);
                self.slots.remove(&evicted);
                self.evicted = self.evicted.saturating_add(1);
                warn!(%evicted, admitted = %id, "Buffer full, evicted resync item");
                Ok(())
            }
            None => {
                self.rejected = self.rejected.saturating_add(1);
                Err(DispatchError::BufferOverflow {
                    id: id.clone(),
                    action,
                })
            }
        }
    }
}
