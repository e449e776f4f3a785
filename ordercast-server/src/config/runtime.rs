//! Runtime configuration types.
//!
//! The broker, pool and stream settings are defined in
//! `ordercast-core::config`; this module re-exports them next to the
//! server-only settings.

pub use ordercast_core::config::{BrokerConfig, PoolConfig, StreamConfig};

use std::net::SocketAddr;

/// HTTP server settings. Applied at startup only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub allowed_origins: Vec<String>,
}
