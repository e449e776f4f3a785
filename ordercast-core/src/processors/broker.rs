//! Event broker processor.
//!
//! The broker is responsible for:
//! - Accepting subscriber registrations and removals from any task
//! - Receiving `OrderEvent`s from producers through a bounded event queue
//! - Fanning each event out to the matching subscribers
//! - Dropping subscribers that cannot keep up
//!
//! All registry mutation happens inside [`BrokerLoop::run`]. Handles only
//! ever send on channels into that loop, so the registry needs no lock.

use super::registry::{CONTROL_BURST, RegistryStats, Subscriber, SubscriberRegistry};
use crate::config::BrokerConfig;
use crate::events::{
    DeliveryReceiver, EventQueueReceiver, EventQueueSender, OrderEvent, PublishError,
    SubscriberId, TargetId, event_queue,
};
use kanau::processor::Processor;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::Stream;
use tracing::{debug, info, trace};

/// Registry changes and queries, processed ahead of events.
#[derive(Debug)]
enum Control {
    Register(Subscriber),
    Unregister(SubscriberId),
    Stats(oneshot::Sender<RegistryStats>),
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable handle to a running broker.
///
/// Every producer and transport adapter receives its own clone; there is no
/// global broker.
#[derive(Debug, Clone)]
pub struct EventBroker {
    control_tx: mpsc::UnboundedSender<Control>,
    events_tx: EventQueueSender,
    subscriber_capacity: usize,
}

impl EventBroker {
    /// Create a broker handle and the loop that backs it.
    ///
    /// The loop does nothing until [`BrokerLoop::run`] is spawned.
    pub fn new(config: BrokerConfig) -> (Self, BrokerLoop) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = event_queue(config.event_capacity, config.overflow);
        let handle = Self {
            control_tx,
            events_tx,
            subscriber_capacity: config.subscriber_capacity,
        };
        let event_loop = BrokerLoop {
            control_rx,
            events_rx,
            registry: SubscriberRegistry::new(),
        };
        (handle, event_loop)
    }

    /// Hand a subscriber to the broker. Never waits.
    ///
    /// Registering an id that is already present is ignored by the loop.
    pub fn register(&self, subscriber: Subscriber) -> Result<(), PublishError> {
        self.control_tx
            .send(Control::Register(subscriber))
            .map_err(|_| PublishError::Closed)
    }

    /// Remove a subscriber. Unknown ids and repeated calls are no-ops, as is
    /// calling this after the broker stopped.
    pub fn unregister(&self, id: SubscriberId) {
        let _ = self.control_tx.send(Control::Unregister(id));
    }

    /// Queue an event for dispatch, following the configured overflow policy.
    pub async fn publish(&self, event: OrderEvent) -> Result<(), PublishError> {
        self.events_tx.send(event).await
    }

    /// Register a fresh subscriber for `target` and return the receiving end
    /// wrapped in a guard that unregisters it when dropped.
    pub fn subscribe(&self, target: TargetId) -> Result<Subscription, PublishError> {
        let (subscriber, rx) = Subscriber::new(target.clone(), self.subscriber_capacity);
        let id = subscriber.id;
        self.register(subscriber)?;
        Ok(Subscription {
            id,
            target,
            rx,
            control_tx: self.control_tx.clone(),
        })
    }

    /// Ask the loop for a snapshot of its registry.
    pub async fn stats(&self) -> Result<RegistryStats, PublishError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(Control::Stats(tx))
            .map_err(|_| PublishError::Closed)?;
        rx.await.map_err(|_| PublishError::Closed)
    }
}

impl Processor<OrderEvent> for EventBroker {
    type Output = ();
    type Error = PublishError;

    async fn process(&self, event: OrderEvent) -> Result<(), PublishError> {
        self.publish(event).await
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// The receiving end of one registered subscriber.
///
/// Dropping it unregisters the subscriber, so cleanup runs on every exit
/// path of the task holding it. Yields `None` once the broker removed the
/// subscriber or shut down.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    target: TargetId,
    rx: DeliveryReceiver,
    control_tx: mpsc::UnboundedSender<Control>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<OrderEvent> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = OrderEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<OrderEvent>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.control_tx.send(Control::Unregister(self.id));
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// The coordination loop owning the registry of one [`EventBroker`].
pub struct BrokerLoop {
    control_rx: mpsc::UnboundedReceiver<Control>,
    events_rx: EventQueueReceiver,
    registry: SubscriberRegistry,
}

impl BrokerLoop {
    /// Run until shutdown is signaled or every handle is dropped.
    ///
    /// Each iteration handles exactly one control message or one event.
    /// Control messages win ties, so a registration that returned before a
    /// publish started is in place when that event is dispatched. After
    /// [`CONTROL_BURST`] control messages in a row, one queued event is
    /// dispatched first, so control traffic cannot starve publishers.
    /// On exit the registry is dropped, closing every delivery channel.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("EventBroker started");

        let mut control_streak = 0;
        loop {
            if control_streak >= CONTROL_BURST {
                control_streak = 0;
                if let Some(event) = self.events_rx.try_recv() {
                    self.dispatch(&event);
                    continue;
                }
            }

            tokio::select! {
                biased;

                // Shutdown has highest priority. A dropped sender counts as shutdown.
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("EventBroker received shutdown signal");
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
                            info!("All broker handles dropped");
                            break;
                        }
                    }
                }

                Some(event) = self.events_rx.recv() => {
                    control_streak = 0;
                    self.dispatch(&event);
                }
            }
        }

        let remaining = self.registry.len();
        self.registry.clear();
        info!(remaining, "EventBroker shutdown complete");
    }

    fn dispatch(&mut self, event: &OrderEvent) {
        let outcome = self.registry.dispatch(event);
        trace!(
            target_id = event.target().unwrap_or("*"),
            delivered = outcome.delivered,
            evicted = outcome.evicted.len(),
            "Dispatched event"
        );
    }

    fn apply(&mut self, control: Control) {
        match control {
            Control::Register(subscriber) => {
                let id = subscriber.id;
                let target = subscriber.target.clone();
                if self.registry.insert(subscriber) {
                    debug!(subscriber_id = %id, target_id = %target, "Subscriber registered");
                }
            }
            Control::Unregister(id) => {
                if self.registry.remove(&id) {
                    debug!(subscriber_id = %id, "Subscriber unregistered");
                }
            }
            Control::Stats(reply) => {
                let _ = reply.send(self.registry.stats());
            }
        }
    }
}
