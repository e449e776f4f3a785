//! Configuration module for ordercast-server.
//!
//! Handles loading configuration from TOML files and CLI arguments.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{BrokerConfig, PoolConfig, ServerConfig, StreamConfig};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub stream: StreamConfig,
    pub pool: PoolConfig,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn load_str(&self, content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;

        Ok(build_loaded_config(file_config))
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let capacities = [
        ("broker.event_capacity", config.broker.event_capacity),
        ("broker.subscriber_capacity", config.broker.subscriber_capacity),
        ("pool.inbound_capacity", config.pool.inbound_capacity),
        ("pool.outbound_capacity", config.pool.outbound_capacity),
    ];
    for (name, value) in capacities {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{name} must be greater than zero"
            )));
        }
    }
    let queues = [
        (
            "broker.event_capacity",
            config.broker.event_capacity,
            config.broker.overflow,
        ),
        (
            "pool.inbound_capacity",
            config.pool.inbound_capacity,
            config.pool.overflow,
        ),
    ];
    for (name, capacity, overflow) in queues {
        let effective = overflow.effective_capacity(capacity);
        if effective != capacity {
            return Err(ConfigError::ValidationError(format!(
                "{name} must be a power of two with the drop_oldest policy (got {capacity}, \
                 the queue would hold {effective})"
            )));
        }
    }
    if config.stream.keep_alive_secs == 0 {
        return Err(ConfigError::ValidationError(
            "stream.keep_alive_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
            allowed_origins: file_config.server.allowed_origins,
        },
        broker: BrokerConfig {
            event_capacity: file_config.broker.event_capacity,
            subscriber_capacity: file_config.broker.subscriber_capacity,
            overflow: file_config.broker.overflow,
        },
        stream: StreamConfig {
            keep_alive: Duration::from_secs(file_config.stream.keep_alive_secs),
        },
        pool: PoolConfig {
            inbound_capacity: file_config.pool.inbound_capacity,
            outbound_capacity: file_config.pool.outbound_capacity,
            overflow: file_config.pool.overflow,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordercast_core::config::OverflowPolicy;

    #[test]
    fn test_listen_override() {
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let loader = ConfigLoader::new("unused.toml", Some(addr));
        let loaded = loader.load_str("[server]\nlisten = \"0.0.0.0:1\"").unwrap();
        assert_eq!(loaded.server.listen, addr);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let loader = ConfigLoader::new("unused.toml", None);
        let err = loader
            .load_str("[pool]\noutbound_capacity = 0")
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(msg) if msg.contains("outbound")));
    }

    #[test]
    fn test_keep_alive_conversion() {
        let loader = ConfigLoader::new("unused.toml", None);
        let loaded = loader.load_str("[stream]\nkeep_alive_secs = 3").unwrap();
        assert_eq!(loaded.stream.keep_alive, Duration::from_secs(3));
    }

    #[test]
    fn test_drop_oldest_capacity_must_be_power_of_two() {
        let loader = ConfigLoader::new("unused.toml", None);
        let err = loader
            .load_str("[broker]\nevent_capacity = 3\n[broker.overflow]\npolicy = \"drop_oldest\"")
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError(msg) if msg.contains("broker.event_capacity"))
        );

        let err = loader
            .load_str("[pool]\ninbound_capacity = 300\n[pool.overflow]\npolicy = \"drop_oldest\"")
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(msg) if msg.contains("512")));

        let loaded = loader
            .load_str("[broker]\nevent_capacity = 4\n[broker.overflow]\npolicy = \"drop_oldest\"")
            .unwrap();
        assert_eq!(loaded.broker.event_capacity, 4);

        // Exact-capacity policies accept any size.
        let loaded = loader
            .load_str("[broker]\nevent_capacity = 3\n[broker.overflow]\npolicy = \"drop_newest\"")
            .unwrap();
        assert_eq!(loaded.broker.event_capacity, 3);
    }

    #[test]
    fn test_pool_overflow_policy() {
        let loader = ConfigLoader::new("unused.toml", None);
        let loaded = loader
            .load_str("[pool.overflow]\npolicy = \"drop_newest\"")
            .unwrap();
        assert_eq!(loaded.pool.overflow, OverflowPolicy::DropNewest);
        let loaded = loader.load_str("").unwrap();
        assert_eq!(loaded.pool.overflow, OverflowPolicy::default());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let loader = ConfigLoader::new("/nonexistent/ordercast.toml", None);
        assert!(matches!(loader.load(), Err(ConfigError::IoError(_))));
    }
}
