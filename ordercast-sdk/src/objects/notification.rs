//! Order notification payloads.
//!
//! Producers publish an [`OrderNotification`] serialized as JSON; the server
//! forwards the text unchanged to every matching subscriber.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle step an order notification reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    /// The customer placed the order.
    Sent,
    /// The shop accepted the order.
    #[default]
    Accepted,
    /// The shop rejected the order.
    Rejected,
    /// The order is ready / handed over.
    Completed,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Sent => "sent",
            OrderAction::Accepted => "accepted",
            OrderAction::Rejected => "rejected",
            OrderAction::Completed => "completed",
        }
    }
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The JSON document delivered to subscribers.
///
/// ```json
/// {"order_id":"42","action":"accepted","message":"ready in 10 min","timestamp":1700000000}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderNotification {
    pub order_id: String,
    pub action: OrderAction,
    /// The full order document, when the producer has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<serde_json::Value>,
    /// Free-form note for the customer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix timestamp (seconds) when the notification was created.
    pub timestamp: i64,
}

impl OrderNotification {
    /// Create a notification stamped with the current time.
    pub fn new(order_id: impl Into<String>, action: OrderAction) -> Self {
        Self {
            order_id: order_id.into(),
            action,
            order: None,
            message: None,
            timestamp: time::OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    pub fn with_order(mut self, order: serde_json::Value) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }
}

/// Body of `POST /sse/acceptorder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptOrderRequest {
    #[serde(alias = "id")]
    pub order_id: String,
    /// Defaults to `accepted`.
    #[serde(default)]
    pub status: OrderAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response of the publish endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResponse {
    pub order_id: String,
    pub action: OrderAction,
}

/// First frame (`event: connected`) of every event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConnected {
    pub subscriber_id: Uuid,
    /// The target the stream listens to, `*` for the wildcard.
    pub target: String,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Live event-stream subscribers.
    pub subscribers: usize,
    /// Live socket connections.
    pub connections: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_request_defaults() {
        let req: AcceptOrderRequest = serde_json::from_str(r#"{"id":"42"}"#).unwrap();
        assert_eq!(req.order_id, "42");
        assert_eq!(req.status, OrderAction::Accepted);
        assert_eq!(req.message, None);

        let req: AcceptOrderRequest =
            serde_json::from_str(r#"{"order_id":"7","status":"rejected","message":"sold out"}"#)
                .unwrap();
        assert_eq!(req.status, OrderAction::Rejected);
        assert_eq!(req.message.as_deref(), Some("sold out"));
    }

    #[test]
    fn test_notification_omits_empty_fields() {
        let n = OrderNotification {
            order_id: "42".into(),
            action: OrderAction::Completed,
            order: None,
            message: None,
            timestamp: 1,
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"order_id":"42","action":"completed","timestamp":1})
        );
    }
}
