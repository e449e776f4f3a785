//! Socket frame types.
//!
//! Clients of the socket pool may send text frames shaped as
//! [`SocketInbound`]. Outbound frames are the raw payloads published into the
//! pool, usually an [`OrderNotification`](super::OrderNotification).

use serde::{Deserialize, Serialize};

/// A client-to-server socket message.
///
/// ```json
/// {"target":"42","payload":{"note":"please add sugar"}}
/// ```
///
/// Without `target` the payload is broadcast to the whole pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketInbound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub payload: serde_json::Value,
}

impl SocketInbound {
    /// Text forwarded to recipients: strings as-is, anything else as JSON.
    pub fn payload_text(&self) -> String {
        match &self.payload {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_text() {
        let msg: SocketInbound =
            serde_json::from_str(r#"{"target":"1","payload":"hello"}"#).unwrap();
        assert_eq!(msg.target.as_deref(), Some("1"));
        assert_eq!(msg.payload_text(), "hello");

        let msg: SocketInbound = serde_json::from_str(r#"{"payload":{"a":1}}"#).unwrap();
        assert_eq!(msg.target, None);
        assert_eq!(msg.payload_text(), r#"{"a":1}"#);
    }
}
