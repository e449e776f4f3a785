//! Event system for the notification core.
//!
//! This module provides event types and channel infrastructure shared by
//! the broker and the socket pool.
//!
//! # Event Flow
//!
//! 1. A producer publishes an `OrderEvent` into an event queue
//! 2. The owning coordination loop dequeues it and matches subscribers
//! 3. Matching subscribers receive it on their delivery channel
//! 4. The transport adapter writes it to the client connection

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, DEFAULT_DELIVERY_BUFFER, DeliveryReceiver, DeliverySender,
    EventQueueReceiver, EventQueueSender, PublishError, delivery_channel, event_queue,
};

pub use types::{OrderEvent, SubscriberId, TargetId};
