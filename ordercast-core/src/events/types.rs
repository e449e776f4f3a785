//! Event type definitions for the notification core.
//!
//! Events are immutable and ephemeral. The payload is opaque text (usually
//! serialized JSON built by the producer); the core only looks at the target
//! to decide who receives it.

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Routing key of a subscriber.
///
/// Several subscribers may share the same target, e.g. the customer's
/// browser and the admin panel both watching one order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetId {
    /// Receives every event, targeted or not. Used by the admin view.
    Wildcard,
    /// Receives broadcasts and events targeted at this order id.
    Order(String),
}

impl TargetId {
    /// Path segments that select the wildcard subscription.
    pub const WILDCARD_ALIASES: [&'static str; 3] = ["", "*", "admin"];

    /// Parse a raw identifier as it arrives in a URL path.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if Self::WILDCARD_ALIASES.contains(&raw) {
            TargetId::Wildcard
        } else {
            TargetId::Order(raw.to_owned())
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, TargetId::Wildcard)
    }

    /// Whether a subscriber with this target should receive `event`.
    pub fn accepts(&self, event: &OrderEvent) -> bool {
        match (self, event.target()) {
            (TargetId::Wildcard, _) => true,
            (TargetId::Order(_), None) => true,
            (TargetId::Order(mine), Some(theirs)) => mine == theirs,
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetId::Wildcard => write!(f, "*"),
            TargetId::Order(id) => write!(f, "{id}"),
        }
    }
}

/// Unique identity of one registered delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Allocate a fresh, time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An order-lifecycle event on its way to subscribers.
///
/// Cloning is cheap: the payload is shared between every recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEvent {
    target: Option<Arc<str>>,
    payload: Arc<str>,
}

impl OrderEvent {
    /// Event delivered only to subscribers of `order_id` (and wildcards).
    ///
    /// An empty `order_id` degrades to a broadcast.
    pub fn targeted(order_id: impl AsRef<str>, payload: impl Into<Arc<str>>) -> Self {
        let order_id = order_id.as_ref().trim();
        Self {
            target: (!order_id.is_empty()).then(|| Arc::from(order_id)),
            payload: payload.into(),
        }
    }

    /// Event delivered to every subscriber.
    pub fn broadcast(payload: impl Into<Arc<str>>) -> Self {
        Self {
            target: None,
            payload: payload.into(),
        }
    }

    /// Target order id, `None` for broadcasts.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn is_broadcast(&self) -> bool {
        self.target.is_none()
    }
}
