//! Socket pool configuration.

use super::OverflowPolicy;
use crate::events::{DEFAULT_CHANNEL_BUFFER, DEFAULT_DELIVERY_BUFFER};

/// Capacities and overflow behaviour of a
/// [`ConnectionPool`](crate::processors::ConnectionPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Capacity of the queue shared by inbound frames and published events.
    pub inbound_capacity: usize,
    /// Capacity of each connection's outbound channel. A connection whose
    /// channel is full is dropped.
    pub outbound_capacity: usize,
    /// Policy applied when the shared queue is full.
    pub overflow: OverflowPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: DEFAULT_CHANNEL_BUFFER,
            outbound_capacity: DEFAULT_DELIVERY_BUFFER,
            overflow: OverflowPolicy::default(),
        }
    }
}
