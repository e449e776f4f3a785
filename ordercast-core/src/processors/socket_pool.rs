//! Connection pool for bidirectional socket clients.
//!
//! The pool mirrors the broker: one loop owns a [`SubscriberRegistry`] of
//! connections and dispatches with the same routing rules. Unlike broker
//! subscribers, pool connections also feed messages back in; inbound frames
//! and producer events share one queue and are fanned out alike.

use super::registry::{CONTROL_BURST, RegistryStats, Subscriber, SubscriberRegistry};
use crate::config::PoolConfig;
use crate::events::{
    DeliveryReceiver, EventQueueReceiver, EventQueueSender, OrderEvent, PublishError,
    SubscriberId, TargetId, event_queue,
};
use kanau::processor::Processor;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace};

#[derive(Debug)]
enum PoolControl {
    Connect(Subscriber),
    Disconnect(SubscriberId),
    Stats(oneshot::Sender<RegistryStats>),
}

/// Cloneable handle to a running connection pool.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    control_tx: mpsc::UnboundedSender<PoolControl>,
    messages_tx: EventQueueSender,
    outbound_capacity: usize,
}

impl ConnectionPool {
    /// Create a pool handle and the loop that backs it.
    pub fn new(config: PoolConfig) -> (Self, PoolLoop) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (messages_tx, messages_rx) = event_queue(config.inbound_capacity, config.overflow);
        let handle = Self {
            control_tx,
            messages_tx,
            outbound_capacity: config.outbound_capacity,
        };
        let pool_loop = PoolLoop {
            control_rx,
            messages_rx,
            registry: SubscriberRegistry::new(),
        };
        (handle, pool_loop)
    }

    /// Add a connection listening to `target`.
    ///
    /// The returned [`PoolConnection`] carries the outbound receiver for the
    /// writer task, the inbound sender for the reader task, and the guard
    /// that removes the connection from the pool when dropped.
    pub fn connect(&self, target: TargetId) -> Result<PoolConnection, PublishError> {
        let (subscriber, outbound) = Subscriber::new(target.clone(), self.outbound_capacity);
        let id = subscriber.id;
        self.control_tx
            .send(PoolControl::Connect(subscriber))
            .map_err(|_| PublishError::Closed)?;
        Ok(PoolConnection {
            guard: ConnectionGuard {
                id,
                target,
                control_tx: self.control_tx.clone(),
            },
            outbound,
            inbound: InboundSender {
                origin: id,
                tx: self.messages_tx.clone(),
            },
        })
    }

    /// Remove a connection. Unknown ids and repeated calls are no-ops.
    pub fn disconnect(&self, id: SubscriberId) {
        let _ = self.control_tx.send(PoolControl::Disconnect(id));
    }

    /// Queue an event for every matching connection, following the
    /// configured overflow policy.
    pub async fn publish(&self, event: OrderEvent) -> Result<(), PublishError> {
        self.messages_tx.send(event).await
    }

    /// Ask the loop for a snapshot of its connections.
    pub async fn stats(&self) -> Result<RegistryStats, PublishError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(PoolControl::Stats(tx))
            .map_err(|_| PublishError::Closed)?;
        rx.await.map_err(|_| PublishError::Closed)
    }
}

impl Processor<OrderEvent> for ConnectionPool {
    type Output = ();
    type Error = PublishError;

    async fn process(&self, event: OrderEvent) -> Result<(), PublishError> {
        self.publish(event).await
    }
}

/// One connection's share of the pool.
#[derive(Debug)]
pub struct PoolConnection {
    pub guard: ConnectionGuard,
    /// Messages to write to the client. Ends when the pool drops the
    /// connection.
    pub outbound: DeliveryReceiver,
    /// Where the reader task puts frames received from the client.
    pub inbound: InboundSender,
}

impl PoolConnection {
    pub fn id(&self) -> SubscriberId {
        self.guard.id
    }
}

/// Removes its connection from the pool when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    id: SubscriberId,
    target: TargetId,
    control_tx: mpsc::UnboundedSender<PoolControl>,
}

impl ConnectionGuard {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let _ = self.control_tx.send(PoolControl::Disconnect(self.id));
    }
}

/// Inbound path of one connection into the pool.
#[derive(Debug, Clone)]
pub struct InboundSender {
    origin: SubscriberId,
    tx: EventQueueSender,
}

impl InboundSender {
    /// Forward a client message to the pool under the same overflow policy
    /// as producer events.
    pub async fn send(&self, event: OrderEvent) -> Result<(), PublishError> {
        trace!(origin = %self.origin, "Inbound socket message");
        self.tx.send(event).await
    }
}

/// The coordination loop owning the connections of one [`ConnectionPool`].
pub struct PoolLoop {
    control_rx: mpsc::UnboundedReceiver<PoolControl>,
    messages_rx: EventQueueReceiver,
    registry: SubscriberRegistry,
}

impl PoolLoop {
    /// Run until shutdown is signaled or every handle is dropped.
    ///
    /// Same discipline as the broker loop: one control message or one
    /// message per iteration, control first, with a queued message let
    /// through after every [`CONTROL_BURST`] control messages.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("ConnectionPool started");

        let mut control_streak = 0;
        loop {
            if control_streak >= CONTROL_BURST {
                control_streak = 0;
                if let Some(message) = self.messages_rx.try_recv() {
                    self.dispatch(&message);
                    continue;
                }
            }

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("ConnectionPool received shutdown signal");
                        break;
                    }
                }

                control = self.control_rx.recv() => {
                    match control {
                        Some(control) => {
                            control_streak += 1;
                            self.apply(control);
                        }
                        None => {
                            info!("All pool handles dropped");
                            break;
                        }
                    }
                }

                Some(message) = self.messages_rx.recv() => {
                    control_streak = 0;
                    self.dispatch(&message);
                }
            }
        }

        let remaining = self.registry.len();
        self.registry.clear();
        info!(remaining, "ConnectionPool shutdown complete");
    }

    fn dispatch(&mut self, message: &OrderEvent) {
        let outcome = self.registry.dispatch(message);
        trace!(
            target_id = message.target().unwrap_or("*"),
            delivered = outcome.delivered,
            dropped = outcome.evicted.len(),
            "Dispatched pool message"
        );
    }

    fn apply(&mut self, control: PoolControl) {
        match control {
            PoolControl::Connect(subscriber) => {
                let id = subscriber.id;
                let target = subscriber.target.clone();
                if self.registry.insert(subscriber) {
                    debug!(
                        connection_id = %id,
                        target_id = %target,
                        connections = self.registry.len(),
                        "Socket connection registered"
                    );
                }
            }
            PoolControl::Disconnect(id) => {
                if self.registry.remove(&id) {
                    debug!(
                        connection_id = %id,
                        connections = self.registry.len(),
                        "Socket connection unregistered"
                    );
                }
            }
            PoolControl::Stats(reply) => {
                let _ = reply.send(self.registry.stats());
            }
        }
    }
}
