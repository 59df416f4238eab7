//! # Stowage
//!
//! Typed values over a synchronous key-value store, kept in sync across every
//! consumer of the same key.
//!
//! ## Building blocks
//!
//! - [`KeyValueStore`](storage::KeyValueStore) - the external string store
//!   (in-memory, JSON file, or your own)
//! - [`Codec`](codec::Codec) - encode/decode pair between stored strings and values
//! - [`NotificationBus`] - in-process pub/sub keyed by topic
//! - [`Synchronizer<T>`] - one key's cached value, written through to the
//!   store and announced on the bus
//! - [`Hub`] - bundles a store, a bus and a [`Config`], and hands out
//!   synchronizers
//!
//! Store and codec failures are logged through `tracing` and never reach the
//! caller; a synchronizer falls back to its default value instead.
//!
//! ```
//! use stowage::{Hub, storage::MemoryStore};
//!
//! let hub = Hub::new(MemoryStore::new());
//! let greeting = hub.string("greeting", Some("hello"));
//! let mirror = hub.string("greeting", None);
//!
//! greeting.set_value("bonjour".to_string());
//! assert_eq!(mirror.get().as_deref(), Some("bonjour"));
//! ```

pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod hub;
pub mod storage;
pub mod sync;

// Re-export main types for convenience
pub use bus::{Event, NotificationBus, Subscription};
pub use codec::Codec;
pub use config::Config;
pub use error::{CodecError, Error, Result, StoreError};
pub use hub::Hub;
pub use sync::{SyncState, Synchronizer};
