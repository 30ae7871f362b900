//! Message transport abstraction and the in-process bus.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::error::MessagingError;

use super::message::Message;

/// Publish/subscribe over named addresses.
///
/// Each address is a queue: every message is delivered to exactly one of the
/// subscriptions draining that address.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Enqueue a message on `address`.
    async fn publish(&self, address: &str, message: Message) -> Result<(), MessagingError>;

    /// Attach a consumer to `address`.
    fn subscribe(&self, address: &str) -> Result<Subscription, MessagingError>;
}

/// A consumer's handle on one address. Clones compete for the same messages.
#[derive(Clone)]
pub struct Subscription {
    address: String,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>>,
}

impl Subscription {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Next message, or `None` once the address is closed and drained.
    pub async fn recv(&self) -> Option<Message> {
        self.receiver.lock().await.recv().await
    }
}

struct Queue {
    sender: Option<mpsc::UnboundedSender<Message>>,
    subscription: Subscription,
}

impl Queue {
    fn new(address: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: Some(tx),
            subscription: Subscription {
                address: address.to_string(),
                receiver: Arc::new(tokio::sync::Mutex::new(rx)),
            },
        }
    }
}

/// In-process transport with one unbounded queue per address.
///
/// Queues are created on first use, so publishing before anyone subscribes
/// buffers the message.
#[derive(Default)]
pub struct InMemoryBus {
    queues: Mutex<HashMap<String, Queue>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<String, Queue>> {
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stop accepting messages on `address`. Subscribers still drain what
    /// is queued, then see `None`.
    pub fn close(&self, address: &str) {
        let mut queues = self.queues();
        let queue = queues
            .entry(address.to_string())
            .or_insert_with(|| Queue::new(address));
        if queue.sender.take().is_some() {
            tracing::debug!("Closed address '{}'", address);
        }
    }
}

#[async_trait]
impl MessageTransport for InMemoryBus {
    async fn publish(&self, address: &str, message: Message) -> Result<(), MessagingError> {
        let closed = || MessagingError::TransportClosed {
            address: address.to_string(),
        };
        let sender = self
            .queues()
            .entry(address.to_string())
            .or_insert_with(|| Queue::new(address))
            .sender
            .clone()
            .ok_or_else(closed)?;
        sender.send(message).map_err(|_| closed())
    }

    fn subscribe(&self, address: &str) -> Result<Subscription, MessagingError> {
        Ok(self
            .queues()
            .entry(address.to_string())
            .or_insert_with(|| Queue::new(address))
            .subscription
            .clone())
    }
}
