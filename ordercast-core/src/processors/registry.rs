//! Client registry shared by the broker and the socket pool.
//!
//! A registry is plain data with no interior locking. It is owned by exactly
//! one coordination loop, which is the only code that ever touches it.

use crate::events::{
    DeliveryReceiver, DeliverySender, OrderEvent, SubscriberId, TargetId, delivery_channel,
};
use std::collections::HashMap;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Control messages a coordination loop handles back to back before it
/// checks for a queued event. Keeps a stream of registrations or stats
/// requests from delaying events indefinitely.
pub const CONTROL_BURST: usize = 64;

/// A delivery channel paired with the target it listens to.
#[derive(Debug)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub target: TargetId,
    pub tx: DeliverySender,
}

impl Subscriber {
    /// Allocate a subscriber with a fresh id and a bounded delivery channel.
    ///
    /// The caller keeps the receiver; the subscriber itself is handed to a
    /// coordination loop.
    pub fn new(target: TargetId, capacity: usize) -> (Self, DeliveryReceiver) {
        let (tx, rx) = delivery_channel(capacity);
        let subscriber = Self {
            id: SubscriberId::new(),
            target,
            tx,
        };
        (subscriber, rx)
    }
}

/// Point-in-time view of a registry, answered by its coordination loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Currently registered subscribers.
    pub subscribers: usize,
    /// How many of them are wildcard subscribers.
    pub wildcard_subscribers: usize,
    /// Events dispatched since the loop started.
    pub events_dispatched: u64,
    /// Individual event copies handed to delivery channels.
    pub deliveries: u64,
    /// Subscribers removed because their channel was full or closed.
    pub evicted: u64,
}

/// Result of dispatching one event.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Number of subscribers that received the event.
    pub delivered: usize,
    /// Subscribers removed during this dispatch.
    pub evicted: Vec<SubscriberId>,
}

#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: HashMap<SubscriberId, (TargetId, DeliverySender)>,
    events_dispatched: u64,
    deliveries: u64,
    evicted: u64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns `false` (and keeps the existing entry) if
    /// the id is already registered.
    pub fn insert(&mut self, subscriber: Subscriber) -> bool {
        if self.subscribers.contains_key(&subscriber.id) {
            debug!(subscriber_id = %subscriber.id, "Duplicate registration ignored");
            return false;
        }
        self.subscribers
            .insert(subscriber.id, (subscriber.target, subscriber.tx));
        true
    }

    /// Remove a subscriber, dropping the registry's end of its channel.
    ///
    /// Returns `false` if it was not registered.
    pub fn remove(&mut self, id: &SubscriberId) -> bool {
        self.subscribers.remove(id).is_some()
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Drop every subscriber, closing all delivery channels.
    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    /// Hand `event` to every matching subscriber without waiting.
    ///
    /// A subscriber whose channel is full or closed is considered dead and
    /// removed on the spot.
    pub fn dispatch(&mut self, event: &OrderEvent) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for (id, (target, tx)) in &self.subscribers {
            if !target.accepts(event) {
                continue;
            }
            match tx.try_send(event.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        subscriber_id = %id,
                        target_id = %target,
                        "Subscriber is not keeping up, dropping it"
                    );
                    outcome.evicted.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(
                        subscriber_id = %id,
                        target_id = %target,
                        "Subscriber channel closed, dropping it"
                    );
                    outcome.evicted.push(*id);
                }
            }
        }

        for id in &outcome.evicted {
            self.subscribers.remove(id);
        }

        self.events_dispatched += 1;
        self.deliveries += outcome.delivered as u64;
        self.evicted += outcome.evicted.len() as u64;
        outcome
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            subscribers: self.subscribers.len(),
            wildcard_subscribers: self
                .subscribers
                .values()
                .filter(|(target, _)| target.is_wildcard())
                .count(),
            events_dispatched: self.events_dispatched,
            deliveries: self.deliveries,
            evicted: self.evicted,
        }
    }
}
