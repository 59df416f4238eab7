use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Type-erased value carried by [`Event::Changed`].
pub type Payload = Arc<dyn Any + Send + Sync>;

type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Identifier of one subscription, unique within a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

/// A notification delivered to subscribers.
#[derive(Clone)]
pub enum Event {
    /// A key's decoded value changed. The payload is an `Option<T>`.
    Changed(Payload),
    /// The whole store was cleared.
    Cleared,
}

impl Event {
    /// Wrap a decoded value.
    pub fn changed<T: Send + Sync + 'static>(value: Option<T>) -> Self {
        Self::Changed(Arc::new(value))
    }

    /// Recover the decoded value of a [`Event::Changed`].
    ///
    /// Returns `None` for [`Event::Cleared`] or when the payload holds a
    /// different type than `T`.
    pub fn value<T: Clone + 'static>(&self) -> Option<Option<T>> {
        match self {
            Self::Changed(payload) => payload.downcast_ref::<Option<T>>().cloned(),
            Self::Cleared => None,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Changed(_) => f.write_str("Changed(..)"),
            Self::Cleared => f.write_str("Cleared"),
        }
    }
}

/// Topic name to subscribers, in subscription order.
#[derive(Default)]
struct Registry {
    topics: HashMap<String, Vec<(SubscriberId, Callback)>>,
}

impl Registry {
    /// Detach one subscriber. The caller drops the returned callback once the
    /// lock is released, since it may own other subscriptions.
    fn remove(&mut self, topic: &str, id: SubscriberId) -> Option<Callback> {
        let subscribers = self.topics.get_mut(topic)?;
        let index = subscribers.iter().position(|(sid, _)| *sid == id)?;
        let (_, callback) = subscribers.remove(index);
        if subscribers.is_empty() {
            self.topics.remove(topic);
        }
        Some(callback)
    }
}

/// In-process publish/subscribe registry keyed by topic.
///
/// A bus is a cheap handle; clones share the same registry. Delivery is
/// synchronous: [`publish`](Self::publish) returns after every subscriber has
/// run. The registry lock is released before any callback runs, so callbacks
/// may subscribe, unsubscribe or publish themselves.
///
/// # Examples
///
/// ```
/// use stowage::bus::{Event, NotificationBus};
/// use std::sync::{Arc, Mutex};
///
/// let bus = NotificationBus::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let _sub = bus.subscribe("volume", {
///     let seen = seen.clone();
///     move |event: &Event| {
///         if let Some(Some(v)) = event.value::<u8>() {
///             seen.lock().unwrap().push(v);
///         }
///     }
/// });
///
/// bus.publish("volume", &Event::changed(Some(7u8)));
/// assert_eq!(*seen.lock().unwrap(), vec![7]);
/// ```
#[derive(Clone, Default)]
pub struct NotificationBus {
    next_id: Arc<AtomicUsize>,
    registry: Arc<RwLock<Registry>>,
}

impl NotificationBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` on `topic`.
    ///
    /// The callback stays registered until the returned guard is dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, topic: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst));

        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .topics
            .entry(topic.clone())
            .or_default()
            .push((id, Arc::new(callback)));

        Subscription {
            topic,
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove subscriber `id` from `topic`. Returns whether anything was removed.
    pub fn unsubscribe(&self, topic: &str, id: SubscriberId) -> bool {
        let removed = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic, id);
        removed.is_some()
    }

    /// Deliver `event` to every subscriber of `topic`, once each.
    ///
    /// Subscribers are snapshotted when the publish starts. Returns how many
    /// were called.
    pub fn publish(&self, topic: &str, event: &Event) -> usize {
        let subscribers: Vec<Callback> = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            match registry.topics.get(topic) {
                Some(subs) => subs.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => return 0,
            }
        };

        tracing::trace!(topic, subscribers = subscribers.len(), ?event, "publish");

        for callback in &subscribers {
            callback(event);
        }
        subscribers.len()
    }

    /// Number of subscribers currently registered on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .topics
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .topics
            .len()
    }
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBus")
            .field("topics", &self.topic_count())
            .finish()
    }
}

/// RAII guard for a bus subscription.
///
/// Dropping it unsubscribes. If the bus itself is gone, the drop is a no-op.
pub struct Subscription {
    topic: String,
    id: SubscriberId,
    registry: Weak<RwLock<Registry>>,
}

impl Subscription {
    /// Topic this subscription listens on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Identifier usable with [`NotificationBus::unsubscribe`].
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let removed = registry
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.topic, self.id);
            drop(removed);
        }
    }
}
