// Copyright (c) 2026 fsrelay contributors
// SPDX-License-Identifier: AGPL-3.0

// Event Bus - Pub/Sub for mount lifecycle events
//
// In-memory fan-out of MountEvents over a tokio broadcast channel. The CLI
// logs them and tests assert on them; nothing in the control path reads them
// back.

use crate::domain::events::MountEvent;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<MountEvent>>,
}

impl EventBus {
    /// Capacity is how many events are buffered before slow receivers lag
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(256)
    }

    pub fn publish(&self, event: MountEvent) {
        debug!("Publishing mount event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to mount event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to events of one mountpoint only
    pub fn subscribe_target(&self, target: impl Into<PathBuf>) -> TargetEventReceiver {
        TargetEventReceiver {
            receiver: self.sender.subscribe(),
            target: target.into(),
        }
    }

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
    receiver: broadcast::Receiver<MountEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<MountEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<MountEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Everything buffered right now, without waiting
    pub fn drain(&mut self) -> Vec<MountEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(event) => events.push(event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }
}

pub struct TargetEventReceiver {
    receiver: broadcast::Receiver<MountEvent>,
    target: PathBuf,
}

impl TargetEventReceiver {
    pub async fn recv(&mut self) -> Result<MountEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.target() == &self.target {
                return Ok(event);
            }
        }
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mount::MountState;
    use chrono::Utc;

    fn transition(target: &str, to: MountState) -> MountEvent {
        MountEvent::StateChanged {
            target: PathBuf::from(target),
            from: MountState::Absent,
            to,
            changed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        bus.publish(transition("/scratch", MountState::Mounting));

        match receiver.recv().await.unwrap() {
            MountEvent::StateChanged { target, to, .. } => {
                assert_eq!(target, PathBuf::from("/scratch"));
                assert_eq!(to, MountState::Mounting);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_target_filtering() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe_target("/b");

        bus.publish(transition("/a", MountState::Mounting));
        bus.publish(transition("/b", MountState::Conflicted));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.target(), &PathBuf::from("/b"));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(transition("/a", MountState::Mounting));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_drain() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        bus.publish(transition("/a", MountState::Mounting));
        bus.publish(transition("/a", MountState::Conflicted));
        assert_eq!(receiver.drain().len(), 2);
        assert!(receiver.drain().is_empty());
    }
}
