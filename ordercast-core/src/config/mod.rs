//! Configuration types for the notification core.
//!
//! These types represent the validated runtime configuration and can be
//! shared across crates. Loading and parsing the config file is handled by
//! the server crate.

mod broker;
mod pool;
mod stream;

pub use broker::{BrokerConfig, OverflowPolicy};
pub use pool::PoolConfig;
pub use stream::StreamConfig;
