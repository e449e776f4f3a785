//! Broker configuration.

use crate::events::{DEFAULT_CHANNEL_BUFFER, DEFAULT_DELIVERY_BUFFER};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a producer experiences when the event queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for free space up to `timeout`, then drop the event and report
    /// `QueueFull` to the producer.
    Block {
        #[serde(with = "millis", rename = "timeout_ms")]
        timeout: Duration,
    },
    /// Reject the new event immediately.
    DropNewest,
    /// Accept the new event and evict the oldest queued one.
    DropOldest,
}

impl OverflowPolicy {
    /// Number of events a queue built with this policy actually holds when
    /// asked for `capacity`.
    ///
    /// The drop-oldest ring only comes in power-of-two sizes, so it rounds
    /// up; the other policies hold exactly `capacity`.
    pub fn effective_capacity(&self, capacity: usize) -> usize {
        let capacity = capacity.max(1);
        match self {
            OverflowPolicy::DropOldest => capacity.next_power_of_two(),
            OverflowPolicy::Block { .. } | OverflowPolicy::DropNewest => capacity,
        }
    }
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::Block {
            timeout: Duration::from_millis(100),
        }
    }
}

/// Capacities and overflow behaviour of an [`EventBroker`](crate::processors::EventBroker).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Capacity of the publish queue.
    pub event_capacity: usize,
    /// Capacity of each subscriber's delivery channel.
    pub subscriber_capacity: usize,
    /// Policy applied when the publish queue is full.
    pub overflow: OverflowPolicy,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_CHANNEL_BUFFER,
            subscriber_capacity: DEFAULT_DELIVERY_BUFFER,
            overflow: OverflowPolicy::default(),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
