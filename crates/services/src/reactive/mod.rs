//! Reactive values: in-memory state that can be observed and that persists
//! itself to local storage.

mod mirrored_map;
mod persisted;

pub use mirrored_map::{LoadState, MergeFn, MirrorKey, MirroredMap};
pub use persisted::PersistedScalar;
