//! Keyed value synchronizers.
//!
//! A [`Synchronizer`] caches one key's decoded value, writes through to the
//! store, and follows writes made by other synchronizers of the same key.

mod synchronizer;

pub use synchronizer::{SyncState, Synchronizer};
