//! # Event Fan-out
//!
//! Every significant transition is emitted as an `Event`. Notification
//! delivery (WebSocket push, webhook fan-out) is an external collaborator;
//! this module only defines the seam it plugs into.

use crate::types::Event;
use tokio::sync::broadcast;

/// Receives events as they're emitted. The default no-op sink is used when
/// nothing downstream is listening.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Drops every event. Used when no subscriber has been configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: Event) {}
}

/// Fans events out over a `tokio::sync::broadcast` channel. Subscribers
/// that lag behind the channel capacity miss older events rather than
/// blocking the writer — matching engine throughput must never depend on
/// a slow consumer.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<Event>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: Event) {
        // No receivers is not an error; it just means nobody is watching yet.
        let _ = self.sender.send(event);
    }
}
