//! Event channel factories and handles.
//!
//! Two kinds of channels exist:
//!
//! - the **event queue** between producers and a coordination loop, whose
//!   behaviour when full is chosen by [`OverflowPolicy`];
//! - one bounded **delivery channel** per subscriber, written with
//!   `try_send` only so a slow client never stalls the loop.

use super::types::OrderEvent;
use crate::config::OverflowPolicy;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

/// Default buffer size for event channels.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Default buffer size of a single subscriber's delivery channel.
pub const DEFAULT_DELIVERY_BUFFER: usize = 64;

/// Sender half of a subscriber's delivery channel.
pub type DeliverySender = mpsc::Sender<OrderEvent>;
/// Receiver half of a subscriber's delivery channel.
pub type DeliveryReceiver = mpsc::Receiver<OrderEvent>;

/// Create a delivery channel for one subscriber.
pub fn delivery_channel(capacity: usize) -> (DeliverySender, DeliveryReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Errors returned to producers when an event cannot be queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// The event queue stayed full for longer than the policy allows.
    #[error("event queue is full, event dropped")]
    QueueFull,

    /// The coordination loop has stopped.
    #[error("event loop is closed")]
    Closed,
}

/// Producer side of an event queue.
#[derive(Debug, Clone)]
pub enum EventQueueSender {
    /// Bounded FIFO; the newest event loses when full.
    Bounded {
        tx: mpsc::Sender<OrderEvent>,
        /// `None` rejects immediately, `Some` waits up to the duration.
        wait: Option<Duration>,
    },
    /// Ring buffer; the oldest unread event is evicted when full.
    Ring(broadcast::Sender<OrderEvent>),
}

/// Consumer side of an event queue, read only by the coordination loop.
#[derive(Debug)]
pub enum EventQueueReceiver {
    Bounded(mpsc::Receiver<OrderEvent>),
    Ring(broadcast::Receiver<OrderEvent>),
}

/// Create an event queue with the given capacity and overflow policy.
pub fn event_queue(
    capacity: usize,
    policy: OverflowPolicy,
) -> (EventQueueSender, EventQueueReceiver) {
    let capacity = capacity.max(1);
    match policy {
        OverflowPolicy::Block { timeout } => {
            let (tx, rx) = mpsc::channel(capacity);
            (
                EventQueueSender::Bounded {
                    tx,
                    wait: Some(timeout),
                },
                EventQueueReceiver::Bounded(rx),
            )
        }
        OverflowPolicy::DropNewest => {
            let (tx, rx) = mpsc::channel(capacity);
            (
                EventQueueSender::Bounded { tx, wait: None },
                EventQueueReceiver::Bounded(rx),
            )
        }
        OverflowPolicy::DropOldest => {
            let effective = policy.effective_capacity(capacity);
            if effective != capacity {
                warn!(
                    requested = capacity,
                    effective,
                    "Drop-oldest queue capacity rounded up to a power of two"
                );
            }
            let (tx, rx) = broadcast::channel(effective);
            (EventQueueSender::Ring(tx), EventQueueReceiver::Ring(rx))
        }
    }
}

impl EventQueueSender {
    /// Queue an event according to the channel's overflow policy.
    pub async fn send(&self, event: OrderEvent) -> Result<(), PublishError> {
        match self {
            EventQueueSender::Bounded { tx, wait: None } => {
                tx.try_send(event).map_err(|e| match e {
                    mpsc::error::TrySendError::Full(_) => PublishError::QueueFull,
                    mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
                })
            }
            EventQueueSender::Bounded {
                tx,
                wait: Some(timeout),
            } => tx.send_timeout(event, *timeout).await.map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => PublishError::QueueFull,
                mpsc::error::SendTimeoutError::Closed(_) => PublishError::Closed,
            }),
            EventQueueSender::Ring(tx) => tx
                .send(event)
                .map(|_| ())
                .map_err(|_| PublishError::Closed),
        }
    }
}

impl EventQueueReceiver {
    /// Receive the next event, or `None` once every sender is gone.
    ///
    /// Evictions in ring mode are logged and skipped over.
    pub async fn recv(&mut self) -> Option<OrderEvent> {
        match self {
            EventQueueReceiver::Bounded(rx) => rx.recv().await,
            EventQueueReceiver::Ring(rx) => loop {
                match rx.recv().await {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(dropped)) => {
                        warn!(dropped, "Event queue overflowed, oldest events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        }
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<OrderEvent> {
        match self {
            EventQueueReceiver::Bounded(rx) => rx.try_recv().ok(),
            EventQueueReceiver::Ring(rx) => loop {
                match rx.try_recv() {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::TryRecvError::Lagged(dropped)) => {
                        warn!(dropped, "Event queue overflowed, oldest events dropped");
                    }
                    Err(_) => return None,
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drop_newest_rejects_when_full() {
        let (tx, mut rx) = event_queue(1, OverflowPolicy::DropNewest);
        tx.send(OrderEvent::broadcast("a")).await.unwrap();
        assert_eq!(
            tx.send(OrderEvent::broadcast("b")).await,
            Err(PublishError::QueueFull)
        );
        assert_eq!(rx.recv().await.unwrap().payload(), "a");
    }

    #[tokio::test]
    async fn test_block_times_out_when_full() {
        let (tx, _rx) = event_queue(
            1,
            OverflowPolicy::Block {
                timeout: Duration::from_millis(20),
            },
        );
        tx.send(OrderEvent::broadcast("a")).await.unwrap();
        assert_eq!(
            tx.send(OrderEvent::broadcast("b")).await,
            Err(PublishError::QueueFull)
        );
    }

    #[tokio::test]
    async fn test_block_waits_for_space() {
        let (tx, mut rx) = event_queue(
            1,
            OverflowPolicy::Block {
                timeout: Duration::from_secs(5),
            },
        );
        tx.send(OrderEvent::broadcast("a")).await.unwrap();
        let consumer = tokio::spawn(async move {
            let first = rx.recv().await.unwrap();
            let second = rx.recv().await.unwrap();
            (first, second)
        });
        tx.send(OrderEvent::broadcast("b")).await.unwrap();
        let (first, second) = consumer.await.unwrap();
        assert_eq!(first.payload(), "a");
        assert_eq!(second.payload(), "b");
    }

    #[tokio::test]
    async fn test_drop_oldest_keeps_newest() {
        let (tx, mut rx) = event_queue(2, OverflowPolicy::DropOldest);
        for payload in ["a", "b", "c"] {
            tx.send(OrderEvent::broadcast(payload)).await.unwrap();
        }
        assert_eq!(rx.recv().await.unwrap().payload(), "b");
        assert_eq!(rx.recv().await.unwrap().payload(), "c");
    }

    #[tokio::test]
    async fn test_drop_oldest_capacity_is_rounded_up() {
        let policy = OverflowPolicy::DropOldest;
        assert_eq!(policy.effective_capacity(3), 4);
        assert_eq!(policy.effective_capacity(300), 512);
        assert_eq!(OverflowPolicy::DropNewest.effective_capacity(3), 3);

        // Asked for 3, holds 4: five sends evict exactly one event.
        let (tx, mut rx) = event_queue(3, policy);
        for payload in ["a", "b", "c", "d", "e"] {
            tx.send(OrderEvent::broadcast(payload)).await.unwrap();
        }
        for expected in ["b", "c", "d", "e"] {
            assert_eq!(rx.recv().await.unwrap().payload(), expected);
        }
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_try_recv_does_not_wait() {
        let (tx, mut rx) = event_queue(4, OverflowPolicy::DropNewest);
        assert!(rx.try_recv().is_none());
        tx.send(OrderEvent::broadcast("a")).await.unwrap();
        assert_eq!(rx.try_recv().unwrap().payload(), "a");
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let (tx, rx) = event_queue(4, OverflowPolicy::DropNewest);
        drop(rx);
        assert_eq!(
            tx.send(OrderEvent::broadcast("a")).await,
            Err(PublishError::Closed)
        );
    }
}
