//! TOML file configuration structures.
//!
//! These structs directly map to the `ordercast.toml` file format. Every
//! section and field is optional.

use ordercast_core::config::OverflowPolicy;
use ordercast_core::events::{DEFAULT_CHANNEL_BUFFER, DEFAULT_DELIVERY_BUFFER};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
    /// Origins allowed by CORS. Empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Event broker section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_channel_buffer")]
    pub event_capacity: usize,
    #[serde(default = "default_delivery_buffer")]
    pub subscriber_capacity: usize,
    #[serde(default)]
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

/// Event stream section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Seconds of silence before a keep-alive comment is sent.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

fn default_keep_alive_secs() -> u64 {
    15
}

/// Socket pool section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_channel_buffer")]
    pub inbound_capacity: usize,
    #[serde(default = "default_delivery_buffer")]
    pub outbound_capacity: usize,
    #[serde(default)]
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

fn default_channel_buffer() -> usize {
    DEFAULT_CHANNEL_BUFFER
}

fn default_delivery_buffer() -> usize {
    DEFAULT_DELIVERY_BUFFER
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"
allowed_origins = ["https://admin.example.com"]

[broker]
event_capacity = 512
subscriber_capacity = 16

[broker.overflow]
policy = "block"
timeout_ms = 250

[stream]
keep_alive_secs = 5

[pool]
inbound_capacity = 128
outbound_capacity = 8

[pool.overflow]
policy = "drop_newest"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.server.allowed_origins.len(), 1);
        assert_eq!(config.broker.event_capacity, 512);
        assert_eq!(
            config.broker.overflow,
            OverflowPolicy::Block {
                timeout: Duration::from_millis(250)
            }
        );
        assert_eq!(config.stream.keep_alive_secs, 5);
        assert_eq!(config.pool.outbound_capacity, 8);
        assert_eq!(config.pool.overflow, OverflowPolicy::DropNewest);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert!(config.server.allowed_origins.is_empty());
        assert_eq!(config.broker.event_capacity, DEFAULT_CHANNEL_BUFFER);
        assert_eq!(config.broker.overflow, OverflowPolicy::default());
        assert_eq!(config.stream.keep_alive_secs, 15);
    }

    #[test]
    fn test_drop_oldest_policy() {
        let config: FileConfig = toml::from_str(
            r#"
[broker.overflow]
policy = "drop_oldest"
"#,
        )
        .unwrap();
        assert_eq!(config.broker.overflow, OverflowPolicy::DropOldest);
    }
}
