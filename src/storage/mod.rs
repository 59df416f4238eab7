//! External key-value stores.
//!
//! Synchronizers never own their data. They delegate to a synchronous
//! [`KeyValueStore`], which can be the in-memory [`MemoryStore`], the
//! JSON-file-backed [`FileStore`], or any host storage behind the same trait.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use crate::error::StoreError;

/// Key written and removed by the default availability check.
pub const PROBE_KEY: &str = "__storage_test__";

/// A synchronous string-to-string store.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key succeeds.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Remove every key.
    fn clear(&self) -> Result<(), StoreError>;

    /// Number of stored keys.
    fn len(&self) -> Result<usize, StoreError>;

    /// Whether the store holds no keys.
    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Check whether the store can be used.
    ///
    /// The default writes and removes [`PROBE_KEY`]. A store that rejects the
    /// write only because it is full still counts as available when it already
    /// holds entries.
    fn is_available(&self) -> bool {
        match self.set(PROBE_KEY, PROBE_KEY) {
            Ok(()) => self.remove(PROBE_KEY).is_ok(),
            Err(StoreError::QuotaExceeded { .. }) => matches!(self.is_empty(), Ok(false)),
            Err(_) => false,
        }
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }

    fn len(&self) -> Result<usize, StoreError> {
        (**self).len()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}
