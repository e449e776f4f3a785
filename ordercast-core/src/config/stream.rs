//! Server-sent events stream configuration.

use std::time::Duration;

/// Settings for long-lived push connections. Reloadable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Idle time after which a keep-alive comment frame is written.
    pub keep_alive: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(15),
        }
    }
}
