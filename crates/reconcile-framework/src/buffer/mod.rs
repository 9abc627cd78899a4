//! The per-identity coalescing event buffer: a pure [`PendingSet`], the [`EventBuffer`]
//! actor that owns it, and the [`BufferClient`] handle.

pub mod actor;
pub mod client;
pub mod message;
pub mod state;

pub use actor::EventBuffer;
pub use client::BufferClient;
pub use message::{BufferRequest, Response};
pub use state::{Admission, BufferStats, Completion, ItemState, PendingSet, WorkItem};
