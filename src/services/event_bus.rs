//! In-process, payload-free publish/subscribe for one browsing context.
//!
//! Subscribers only learn that a topic fired; they re-fetch whatever they
//! display. Subscriptions are owned by the view that created them and stop
//! delivery as soon as they are unsubscribed or dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    BookingCreated,
    BookingCancelled,
    FavoriteUpdated,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::BookingCreated => "bookingCreated",
            Topic::BookingCancelled => "bookingCancelled",
            Topic::FavoriteUpdated => "favoriteUpdated",
        }
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

struct Listener {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<Topic, Vec<Listener>>>,
}

impl Registry {
    fn remove(&self, topic: Topic, id: u64) {
        let mut listeners = self.listeners.lock();
        if let Some(list) = listeners.get_mut(&topic) {
            list.retain(|l| l.id != id);
            if list.is_empty() {
                listeners.remove(&topic);
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: Topic, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        self.registry
            .listeners
            .lock()
            .entry(topic)
            .or_default()
            .push(Listener {
                id,
                active: active.clone(),
                callback: Arc::new(callback),
            });

        Subscription {
            topic,
            id,
            active,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Invokes every current subscriber of `topic` synchronously and returns
    /// how many ran. Callbacks run outside the registry lock.
    pub fn publish(&self, topic: Topic) -> usize {
        let snapshot: Vec<(Arc<AtomicBool>, Callback)> = self
            .registry
            .listeners
            .lock()
            .get(&topic)
            .map(|list| {
                list.iter()
                    .map(|l| (l.active.clone(), l.callback.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let mut delivered = 0;
        for (active, callback) in snapshot {
            // A subscriber removed by an earlier callback must not run.
            if !active.load(Ordering::Acquire) {
                continue;
            }
            callback();
            delivered += 1;
        }

        debug!(topic = topic.as_str(), delivered, "event_bus_publish");
        delivered
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.registry
            .listeners
            .lock()
            .get(&topic)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Handle for one registered callback. Dropping it unsubscribes.
pub struct Subscription {
    topic: Topic,
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn unsubscribe(self) {
        drop(self);
    }

    fn detach(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.topic, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
