//! Application state shared across all request handlers.

use crate::config::runtime::StreamConfig;
use crate::notifier::Notifier;
use ordercast_core::processors::{ConnectionPool, EventBroker};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc or
/// is a channel handle).
#[derive(Clone)]
pub struct AppState {
    /// Push-stream broker.
    pub broker: EventBroker,
    /// Bidirectional socket pool.
    pub pool: ConnectionPool,
    /// Publish capability handed to producers.
    pub notifier: Notifier,
    /// Event stream settings (can be reloaded via SIGHUP).
    pub stream: Arc<RwLock<StreamConfig>>,
}

impl AppState {
    /// Create a new AppState around running broker and pool handles.
    pub fn new(broker: EventBroker, pool: ConnectionPool, stream: StreamConfig) -> Self {
        Self {
            notifier: Notifier::new(broker.clone(), pool.clone()),
            broker,
            pool,
            stream: Arc::new(RwLock::new(stream)),
        }
    }

    /// Current event stream settings.
    pub async fn stream_config(&self) -> StreamConfig {
        *self.stream.read().await
    }

    /// Update the stream settings (used during SIGHUP reload).
    pub async fn update_stream_config(&self, new_config: StreamConfig) {
        let mut config = self.stream.write().await;
        *config = new_config;
    }
}
