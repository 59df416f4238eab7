//! In-process notification bus.
//!
//! Topics are storage keys plus one reserved clear-topic. Synchronizers
//! subscribe to both and keep each other up to date through it.

mod bus;

pub use bus::{Event, NotificationBus, Payload, SubscriberId, Subscription};
