//! Data types of the sample controller: the mirrored [`ConfigEntry`] and the [`Store`]
//! tables holding desired and mirrored state.

pub mod config_entry;
pub mod store;

pub use config_entry::*;
pub use store::*;
