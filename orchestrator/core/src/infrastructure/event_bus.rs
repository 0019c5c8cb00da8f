// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Fan-out Hub for Dashboard Messages
//
// Relays every backend broadcast to every connected dashboard using a tokio
// broadcast channel. Each subscriber sees messages in publish order. A
// subscriber that falls more than `capacity` messages behind skips the oldest
// ones (no replay); dashboards recover by re-fetching the swarm snapshot.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::HubMessage;

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<HubMessage>>,
}

impl EventBus {
    /// Create a new hub buffering up to `capacity` messages per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create hub with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish a message to all current subscribers
    pub fn publish(&self, message: HubMessage) {
        debug!(kind = %message.kind, "Publishing hub message");

        let receiver_count = self.sender.send(message).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No dashboards connected");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<HubMessage>,
}

impl EventReceiver {
    /// Receive the next message (waits until one is available)
    pub async fn recv(&mut self) -> Result<HubMessage, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Hub subscriber lagged by {} messages", n);
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<HubMessage, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Hub subscriber lagged by {} messages", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus closed")]
    Closed,

    #[error("Receiver lagged by {0} events")]
    Lagged(u64),

    #[error("No events available")]
    Empty,
}
