//! Topic-based publish/subscribe inside one context.
//!
//! Subscribing returns a [`Subscription`] guard; dropping it unsubscribes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use crate::protocol::{MessageKind, SyncMessage};

type Callback = Arc<dyn Fn(&SyncMessage) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: BTreeMap<u64, (MessageKind, Callback)>,
}

/// Local message bus keyed by [`MessageKind`].
#[derive(Clone, Default)]
pub struct PubSub {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl std::fmt::Debug for PubSub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl PubSub {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` for every message of `kind` until the returned guard is
    /// dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(
        &self,
        kind: MessageKind,
        callback: impl Fn(&SyncMessage) + Send + Sync + 'static,
    ) -> Subscription {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.entries.insert(id, (kind, Arc::new(callback)));
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Deliver `message` to its topic's subscribers, in subscription order.
    /// Returns how many were called.
    pub fn publish(&self, message: &SyncMessage) -> usize {
        let kind = message.kind();
        // Callbacks run outside the lock so they may subscribe or publish.
        let callbacks: Vec<Callback> = self
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entries
            .values()
            .filter(|(k, _)| *k == kind)
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in &callbacks {
            callback(message);
        }
        callbacks.len()
    }

    /// Number of live subscriptions across all topics.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entries
            .len()
    }
}

/// Guard for one subscription.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .entries
                .remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_publish_by_topic() {
        let bus = PubSub::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = bus.subscribe(MessageKind::HoverChange, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.publish(&SyncMessage::HoverChange { instance_id: None }), 1);
        assert_eq!(
            bus.publish(&SyncMessage::SelectionChange { instance_id: None }),
            0
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = PubSub::new();
        let first = bus.subscribe(MessageKind::HoverChange, |_| {});
        let second = bus.subscribe(MessageKind::SelectionChange, |_| {});
        assert_eq!(bus.subscriber_count(), 2);
        drop(first);
        assert_eq!(bus.subscriber_count(), 1);
        drop(second);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let bus = PubSub::new();
        let sub = bus.subscribe(MessageKind::HoverChange, |_| {});
        drop(bus);
        drop(sub);
    }
}
