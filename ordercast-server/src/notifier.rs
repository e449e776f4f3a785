//! Publish capability handed to request handlers.
//!
//! Producers only see [`Notifier`]: one `process` call puts the event in
//! front of both transports.

use kanau::processor::Processor;
use ordercast_core::events::{OrderEvent, PublishError};
use ordercast_core::processors::{ConnectionPool, EventBroker};
use tracing::warn;

/// Fans a published event out to the socket pool and the event broker.
///
/// Both queues apply their configured overflow policy. The event is offered
/// to both even if one refuses it; the producer then sees the first error,
/// broker first.
#[derive(Debug, Clone)]
pub struct Notifier {
    broker: EventBroker,
    pool: ConnectionPool,
}

impl Notifier {
    pub fn new(broker: EventBroker, pool: ConnectionPool) -> Self {
        Self { broker, pool }
    }
}

impl Processor<OrderEvent> for Notifier {
    type Output = ();
    type Error = PublishError;

    async fn process(&self, event: OrderEvent) -> Result<(), PublishError> {
        let target = event.target().unwrap_or("*").to_owned();
        let pooled = self.pool.process(event.clone()).await;
        if let Err(e) = &pooled {
            warn!(error = %e, target_id = %target, "Socket pool did not accept event");
        }
        let brokered = self.broker.process(event).await;
        if let Err(e) = &brokered {
            warn!(error = %e, target_id = %target, "Event broker did not accept event");
        }
        brokered.and(pooled)
    }
}
