//! Coordination loops of the notification core.
//!
//! - `EventBroker`: fans `OrderEvent`s out to push-stream subscribers
//! - `ConnectionPool`: fans inbound socket messages and `OrderEvent`s out
//!   to bidirectional socket connections
//!
//! Both own a `SubscriberRegistry` exclusively inside their loop.

pub mod broker;
pub mod registry;
pub mod socket_pool;

pub use broker::{BrokerLoop, EventBroker, Subscription};
pub use registry::{DispatchOutcome, RegistryStats, Subscriber, SubscriberRegistry};
pub use socket_pool::{ConnectionGuard, ConnectionPool, InboundSender, PoolConnection, PoolLoop};
