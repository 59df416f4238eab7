use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use crate::bus::{Event, NotificationBus, Subscription};
use crate::codec::Codec;
use crate::config::Config;
use crate::error::Error;
use crate::storage::KeyValueStore;

const VALUE_TOPIC: &str = "value";

/// Point-in-time view of a synchronizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState<T> {
    /// Current decoded value, or the default.
    pub value: Option<T>,
    /// `true` until the first load from the store finishes, and again while a
    /// reload after a clear is running.
    pub loading: bool,
    /// `false` once the store failed its availability check.
    pub available: bool,
}

struct Inner<T> {
    key: String,
    default: Option<T>,
    codec: Arc<dyn Codec<T>>,
    store: Arc<dyn KeyValueStore>,
    persist_defaults: bool,
    state: RwLock<SyncState<T>>,
    watchers: NotificationBus,
}

impl<T> Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Replace the cached value and tell watchers. No lock is held while they run.
    fn apply(&self, value: Option<T>) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .value = value.clone();
        self.watchers.publish(VALUE_TOPIC, &Event::changed(value));
    }

    fn decode_or_default(&self, encoded: &str) -> Option<T> {
        match self.codec.decode(encoded) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "stored value failed to decode, using default");
                self.default.clone()
            }
        }
    }

    fn load(&self) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .loading = true;

        let available = self.store.is_available();
        if !available {
            tracing::warn!(key = %self.key, "key-value store failed its availability check, writes may stay in memory");
        }

        // A store that cannot take writes may still be readable.
        let value = match self.store.get(&self.key) {
            Ok(Some(encoded)) => self.decode_or_default(&encoded),
            Ok(None) => {
                if available && self.persist_defaults {
                    if let Some(default) = &self.default {
                        if let Err(e) = self.store_encoded(default) {
                            tracing::warn!(key = %self.key, error = %e, "failed to persist default");
                        }
                    }
                }
                self.default.clone()
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "failed to read key, using default");
                self.default.clone()
            }
        };

        tracing::debug!(key = %self.key, available, "loaded");

        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.loading = false;
            state.available = available;
        }
        self.apply(value);
    }

    fn restore(&self) {
        match self.store.get(&self.key) {
            Ok(Some(encoded)) => {
                let value = self.decode_or_default(&encoded);
                self.apply(value);
            }
            Ok(None) => self.apply(self.default.clone()),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "failed to restore key, keeping cached value");
            }
        }
    }

    fn store_encoded(&self, value: &T) -> Result<(), Error> {
        let encoded = self
            .codec
            .encode(value)
            .map_err(|e| Error::codec(self.key.as_str(), e))?;
        self.store.set(&self.key, &encoded)?;
        Ok(())
    }

    fn remove_stored(&self) {
        if let Err(e) = self.store.remove(&self.key) {
            tracing::warn!(key = %self.key, error = %e, "failed to remove key");
        }
    }
}

/// A typed value bound to one key of a [`KeyValueStore`].
///
/// On construction the synchronizer subscribes to its key's topic and to the
/// clear-topic, then loads its value from the store. Every synchronizer for
/// the same key on the same bus sees every write made through any of them.
/// Dropping it unsubscribes.
///
/// Store and codec failures never surface. They are logged; an unreadable
/// value falls back to the default and an unencodable write is dropped.
///
/// # Examples
///
/// ```
/// use stowage::{Hub, storage::MemoryStore};
///
/// let hub = Hub::new(MemoryStore::new());
/// let a = hub.number("volume", Some(5.0));
/// let b = hub.number("volume", Some(5.0));
///
/// a.set_value(9.0);
/// assert_eq!(b.get(), Some(9.0));
///
/// b.reset();
/// assert_eq!(a.get(), Some(5.0));
/// ```
pub struct Synchronizer<T> {
    inner: Arc<Inner<T>>,
    bus: NotificationBus,
    _subscriptions: [Subscription; 2],
}

impl<T> Synchronizer<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Bind `key` to `store`, announcing changes on `bus`.
    ///
    /// The key is namespaced through [`Config::storage_key`].
    pub fn new<C>(
        key: &str,
        default: Option<T>,
        codec: C,
        store: Arc<dyn KeyValueStore>,
        bus: NotificationBus,
        config: &Config,
    ) -> Self
    where
        C: Codec<T> + 'static,
    {
        let key = config.storage_key(key);
        let inner = Arc::new(Inner {
            key: key.clone(),
            state: RwLock::new(SyncState {
                value: default.clone(),
                loading: true,
                available: true,
            }),
            default,
            codec: Arc::new(codec),
            store,
            persist_defaults: config.persist_defaults,
            watchers: NotificationBus::new(),
        });

        let on_change = {
            let inner: Weak<Inner<T>> = Arc::downgrade(&inner);
            bus.subscribe(key, move |event| {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                match event.value::<T>() {
                    Some(value) => inner.apply(value),
                    None => {
                        tracing::debug!(key = %inner.key, "foreign payload on key topic, restoring from store");
                        inner.restore();
                    }
                }
            })
        };

        let on_clear = {
            let inner: Weak<Inner<T>> = Arc::downgrade(&inner);
            bus.subscribe(config.clear_topic.clone(), move |event| {
                if !matches!(event, Event::Cleared) {
                    return;
                }
                if let Some(inner) = inner.upgrade() {
                    inner.load();
                }
            })
        };

        inner.load();

        Self {
            inner,
            bus,
            _subscriptions: [on_change, on_clear],
        }
    }

    /// Current value, or the default when nothing is set.
    pub fn get(&self) -> Option<T> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .value
            .clone()
    }

    /// Read the value with a function without cloning.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let state = self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(state.value.as_ref())
    }

    /// Clone of the full state.
    pub fn snapshot(&self) -> SyncState<T> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Key as stored, including any namespace.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Value used when the key is missing, unreadable or reset.
    pub fn default_value(&self) -> Option<&T> {
        self.inner.default.as_ref()
    }

    /// Whether a load from the store is in progress.
    pub fn is_loading(&self) -> bool {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .loading
    }

    /// Whether the store passed its availability check on the last load.
    pub fn is_available(&self) -> bool {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .available
    }

    /// Write a value.
    ///
    /// `Some` is encoded and stored; `None` removes the key from the store.
    /// The resulting value (`None` becomes the default) is then published on
    /// the key's topic, which updates this synchronizer and every other one
    /// bound to the key.
    ///
    /// A value the codec cannot encode is logged and dropped: the store, the
    /// cached value and every peer keep what they had. A store that rejects
    /// the write does not stop the publish, so peers keep working in memory.
    pub fn set(&self, value: Option<T>) {
        match &value {
            Some(v) => match self.inner.store_encoded(v) {
                Ok(()) => {}
                Err(e @ Error::Codec { .. }) => {
                    tracing::error!(key = %self.inner.key, error = %e, "write dropped");
                    return;
                }
                Err(e) if e.is_unavailable() => {
                    tracing::debug!(key = %self.inner.key, "store unavailable, write kept in memory");
                }
                Err(e) => {
                    tracing::warn!(key = %self.inner.key, error = %e, "failed to write key");
                }
            },
            None => self.inner.remove_stored(),
        }

        let effective = value.or_else(|| self.inner.default.clone());
        let delivered = self
            .bus
            .publish(&self.inner.key, &Event::changed(effective));
        tracing::debug!(key = %self.inner.key, delivered, "wrote");
    }

    /// Write `value`. Shorthand for `set(Some(value))`.
    pub fn set_value(&self, value: T) {
        self.set(Some(value));
    }

    /// Remove the key from the store. Shorthand for `set(None)`.
    pub fn remove(&self) {
        self.set(None);
    }

    /// Modify the current value in place and write the result.
    pub fn update(&self, f: impl FnOnce(&mut Option<T>)) {
        let mut value = self.get();
        f(&mut value);
        self.set(value);
    }

    /// Write the default value back.
    pub fn reset(&self) {
        self.set(self.inner.default.clone());
    }

    /// Re-read the key from the store, picking up changes made outside this
    /// library. The result is not published.
    pub fn restore(&self) {
        self.inner.restore();
    }

    /// Run the initial load again: availability check, read, decode.
    pub fn load(&self) {
        self.inner.load();
    }

    /// Call `callback` with the new value whenever it changes.
    ///
    /// The callback runs for bus deliveries, restores and reloads, until the
    /// returned guard is dropped.
    #[must_use = "dropping the subscription stops watching immediately"]
    pub fn watch<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<T>) + Send + Sync + 'static,
    {
        self.inner.watchers.subscribe(VALUE_TOPIC, move |event| {
            if let Some(value) = event.value::<T>() {
                callback(value);
            }
        })
    }
}

impl<T> fmt::Debug for Synchronizer<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Synchronizer")
            .field("key", &self.inner.key)
            .field("state", &*state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BoolCodec, JsonCodec, NumberCodec, StringCodec};
    use crate::error::StoreError;
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn setup() -> (Arc<MemoryStore>, NotificationBus, Config) {
        (
            Arc::new(MemoryStore::new()),
            NotificationBus::new(),
            Config::default(),
        )
    }

    fn string_sync(
        key: &str,
        default: Option<&str>,
        store: &Arc<MemoryStore>,
        bus: &NotificationBus,
        config: &Config,
    ) -> Synchronizer<String> {
        Synchronizer::new(
            key,
            default.map(str::to_string),
            StringCodec,
            store.clone(),
            bus.clone(),
            config,
        )
    }

    #[test]
    fn loads_stored_value() {
        let (store, bus, config) = setup();
        store.set("name", "ada").unwrap();

        let sync = string_sync("name", Some("anon"), &store, &bus, &config);
        assert_eq!(sync.get().as_deref(), Some("ada"));
        assert!(!sync.is_loading());
        assert!(sync.is_available());
    }

    #[test]
    fn missing_key_persists_default() {
        let (store, bus, config) = setup();
        let sync = string_sync("name", Some("anon"), &store, &bus, &config);

        assert_eq!(sync.get().as_deref(), Some("anon"));
        assert_eq!(store.get("name").unwrap().as_deref(), Some("anon"));
    }

    #[test]
    fn missing_key_without_persist_leaves_store_alone() {
        let (store, bus, _) = setup();
        let config = Config::default().with_persist_defaults(false);
        let sync = string_sync("name", Some("anon"), &store, &bus, &config);

        assert_eq!(sync.get().as_deref(), Some("anon"));
        assert_eq!(store.get("name").unwrap(), None);
    }

    #[test]
    fn no_default_means_none() {
        let (store, bus, config) = setup();
        let sync = string_sync("name", None, &store, &bus, &config);
        assert_eq!(sync.get(), None);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn decode_failure_falls_back_to_default() {
        let (store, bus, config) = setup();
        store.set("flag", "maybe").unwrap();

        let sync = Synchronizer::new("flag", Some(true), BoolCodec, store.clone(), bus, &config);
        assert_eq!(sync.get(), Some(true));
        // The unreadable value is left for the next write to replace.
        assert_eq!(store.get("flag").unwrap().as_deref(), Some("maybe"));
    }

    #[test]
    fn write_stores_and_updates_self() {
        let (store, bus, config) = setup();
        let sync = string_sync("name", Some("anon"), &store, &bus, &config);

        sync.set_value("grace".to_string());
        assert_eq!(sync.get().as_deref(), Some("grace"));
        assert_eq!(store.get("name").unwrap().as_deref(), Some("grace"));
    }

    #[test]
    fn write_none_removes_key_and_shows_default() {
        let (store, bus, config) = setup();
        let sync = string_sync("name", Some("anon"), &store, &bus, &config);
        sync.set_value("grace".to_string());

        sync.remove();
        assert_eq!(store.get("name").unwrap(), None);
        assert_eq!(sync.get().as_deref(), Some("anon"));
    }

    #[test]
    fn unencodable_write_changes_nothing() {
        let (store, bus, config) = setup();
        let a = Synchronizer::new("n", Some(1.0), NumberCodec, store.clone(), bus.clone(), &config);
        let b = Synchronizer::new("n", Some(1.0), NumberCodec, store.clone(), bus.clone(), &config);
        a.set_value(2.0);

        let count = Arc::new(AtomicUsize::new(0));
        let _watch = b.watch({
            let count = count.clone();
            move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        a.set_value(f64::NAN);
        assert_eq!(store.get("n").unwrap().as_deref(), Some("2"));
        assert_eq!(a.get(), Some(2.0));
        assert_eq!(b.get(), Some(2.0));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let fresh = Synchronizer::new("n", Some(1.0), NumberCodec, store.clone(), bus, &config);
        assert_eq!(fresh.get(), a.get());
    }

    #[test]
    fn full_store_still_serves_stored_value() {
        let store = Arc::new(MemoryStore::with_quota(10));
        store.set("k", "stored123").unwrap();

        let sync = string_sync("k", Some("dflt"), &store, &NotificationBus::new(), &Config::default());
        assert_eq!(sync.get().as_deref(), Some("stored123"));
        assert!(sync.is_available());
    }

    /// Serves reads from an inner store but rejects every write.
    struct ReadOnly(MemoryStore);

    impl KeyValueStore for ReadOnly {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.0.get(key)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable)
        }

        fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable)
        }

        fn clear(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable)
        }

        fn len(&self) -> Result<usize, StoreError> {
            self.0.len()
        }
    }

    #[test]
    fn unwritable_store_still_reads_stored_value() {
        let inner = MemoryStore::new();
        inner.set("k", "v").unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(ReadOnly(inner));

        let sync = Synchronizer::new(
            "k",
            Some("dflt".to_string()),
            StringCodec,
            store,
            NotificationBus::new(),
            &Config::default(),
        );
        assert!(!sync.is_available());
        assert_eq!(sync.get().as_deref(), Some("v"));
    }

    #[test]
    fn key_named_like_clear_topic_does_not_reload_others() {
        let (store, bus, config) = setup();
        let name = string_sync("name", Some("anon"), &store, &bus, &config);
        name.set_value("ada".to_string());
        store.set("name", "outside").unwrap();

        let odd = string_sync(&config.clear_topic, None, &store, &bus, &config);
        odd.set_value("x".to_string());

        assert_eq!(name.get().as_deref(), Some("ada"));
        assert_eq!(odd.get().as_deref(), Some("x"));
    }

    #[test]
    fn update_and_reset() {
        let (store, bus, config) = setup();
        let sync = Synchronizer::new(
            "list",
            Some(vec![1u32]),
            JsonCodec::<Vec<u32>>::new(),
            store.clone(),
            bus,
            &config,
        );

        sync.update(|v| v.get_or_insert_with(Vec::new).push(2));
        assert_eq!(sync.get(), Some(vec![1, 2]));
        assert_eq!(store.get("list").unwrap().as_deref(), Some("[1,2]"));

        sync.reset();
        assert_eq!(sync.get(), Some(vec![1]));
        assert_eq!(store.get("list").unwrap().as_deref(), Some("[1]"));
    }

    #[test]
    fn restore_picks_up_external_write() {
        let (store, bus, config) = setup();
        let sync = string_sync("name", Some("anon"), &store, &bus, &config);

        store.set("name", "outside").unwrap();
        assert_eq!(sync.get().as_deref(), Some("anon"));

        sync.restore();
        assert_eq!(sync.get().as_deref(), Some("outside"));

        store.remove("name").unwrap();
        sync.restore();
        assert_eq!(sync.get().as_deref(), Some("anon"));
    }

    #[test]
    fn unavailable_store_degrades_to_memory() {
        let (store, bus, config) = setup();
        store.set_available(false);

        let sync = string_sync("name", Some("anon"), &store, &bus, &config);
        assert!(!sync.is_available());
        assert_eq!(sync.get().as_deref(), Some("anon"));

        sync.set_value("local".to_string());
        assert_eq!(sync.get().as_deref(), Some("local"));

        store.set_available(true);
        assert_eq!(store.get("name").unwrap(), None);
    }

    #[test]
    fn reload_after_store_returns() {
        let (store, bus, config) = setup();
        store.set_available(false);
        let sync = string_sync("name", Some("anon"), &store, &bus, &config);
        assert!(!sync.is_available());

        store.set_available(true);
        sync.load();
        assert!(sync.is_available());
        assert_eq!(store.get("name").unwrap().as_deref(), Some("anon"));
    }

    #[test]
    fn namespace_prefixes_key() {
        let (store, bus, _) = setup();
        let config = Config::default().with_namespace("app");
        let sync = string_sync("name", Some("anon"), &store, &bus, &config);

        assert_eq!(sync.key(), "app:name");
        assert_eq!(store.get("app:name").unwrap().as_deref(), Some("anon"));
        assert_eq!(bus.subscriber_count("app:name"), 1);
    }

    #[test]
    fn watch_sees_each_change_once() {
        let (store, bus, config) = setup();
        let sync = string_sync("name", Some("anon"), &store, &bus, &config);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let guard = sync.watch({
            let seen = seen.clone();
            move |v| seen.lock().unwrap().push(v)
        });

        sync.set_value("a".to_string());
        sync.remove();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some("a".to_string()), Some("anon".to_string())]
        );

        drop(guard);
        sync.set_value("b".to_string());
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn drop_unsubscribes_from_bus() {
        let (store, bus, config) = setup();
        let sync = string_sync("name", None, &store, &bus, &config);
        assert_eq!(bus.subscriber_count("name"), 1);
        assert_eq!(bus.subscriber_count(&config.clear_topic), 1);

        drop(sync);
        assert_eq!(bus.topic_count(), 0);
    }

    #[test]
    fn mismatched_payload_restores_from_store() {
        let (store, bus, config) = setup();
        let text = string_sync("shared", None, &store, &bus, &config);
        let count = Arc::new(AtomicUsize::new(0));
        let _watch = text.watch({
            let count = count.clone();
            move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        let flag = Synchronizer::new("shared", None, BoolCodec, store.clone(), bus, &config);
        flag.set_value(true);

        assert_eq!(text.get().as_deref(), Some("true"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
