//! Entry point tying a store, a bus and a configuration together.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bus::{Event, NotificationBus};
use crate::codec::{BoolCodec, Codec, JsonCodec, NumberCodec, StringCodec};
use crate::config::Config;
use crate::storage::KeyValueStore;
use crate::sync::Synchronizer;

/// Creates synchronizers that share one store and one bus.
///
/// A hub is a cheap handle; clones share the store and the bus, so
/// synchronizers created from any clone stay in sync.
///
/// # Examples
///
/// ```
/// use stowage::{Hub, storage::MemoryStore};
///
/// let hub = Hub::new(MemoryStore::new());
/// let dark = hub.boolean("dark-mode", Some(false));
/// dark.set_value(true);
///
/// hub.clear();
/// assert_eq!(dark.get(), Some(false));
/// ```
#[derive(Clone)]
pub struct Hub {
    store: Arc<dyn KeyValueStore>,
    bus: NotificationBus,
    config: Config,
}

impl Hub {
    /// Create a hub over `store` with the default configuration.
    pub fn new<S: KeyValueStore + 'static>(store: S) -> Self {
        Self::with_config(store, Config::default())
    }

    /// Create a hub over `store` with `config`.
    pub fn with_config<S: KeyValueStore + 'static>(store: S, config: Config) -> Self {
        Self::with_bus(store, NotificationBus::new(), config)
    }

    /// Create a hub that announces changes on an existing bus.
    pub fn with_bus<S: KeyValueStore + 'static>(
        store: S,
        bus: NotificationBus,
        config: Config,
    ) -> Self {
        Self {
            store: Arc::new(store),
            bus,
            config,
        }
    }

    /// Bind `key` with a caller-supplied codec.
    pub fn item<T, C>(&self, key: &str, default: Option<T>, codec: C) -> Synchronizer<T>
    where
        T: Clone + Send + Sync + 'static,
        C: Codec<T> + 'static,
    {
        Synchronizer::new(
            key,
            default,
            codec,
            Arc::clone(&self.store),
            self.bus.clone(),
            &self.config,
        )
    }

    /// Bind `key` to a boolean stored as `"true"`/`"false"`.
    pub fn boolean(&self, key: &str, default: Option<bool>) -> Synchronizer<bool> {
        self.item(key, default, BoolCodec)
    }

    /// Bind `key` to a number stored as decimal text.
    pub fn number(&self, key: &str, default: Option<f64>) -> Synchronizer<f64> {
        self.item(key, default, NumberCodec)
    }

    /// Bind `key` to a string stored as is.
    pub fn string(&self, key: &str, default: Option<&str>) -> Synchronizer<String> {
        self.item(key, default.map(str::to_string), StringCodec)
    }

    /// Bind `key` to any serde type stored as JSON.
    pub fn object<T>(&self, key: &str, default: Option<T>) -> Synchronizer<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.item(key, default, JsonCodec::<T>::new())
    }

    /// Remove every key from the store and tell every live synchronizer to
    /// reload. Returns how many synchronizers were notified.
    ///
    /// A failing store is logged; the reload still happens.
    pub fn clear(&self) -> usize {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "failed to clear key-value store");
        }
        let notified = self.bus.publish(&self.config.clear_topic, &Event::Cleared);
        tracing::debug!(notified, "cleared");
        notified
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// The shared bus.
    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// The configuration given to every synchronizer.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("bus", &self.bus)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
