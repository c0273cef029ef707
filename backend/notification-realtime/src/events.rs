//! Typed system events published to the rest of the application.
//!
//! Producers are the message router (moderation actions) and the channel
//! orchestrator (connection lifecycle). The set of event kinds is closed so
//! every consumer can match exhaustively.

use crate::models::{ChannelKind, ConnectionState};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    /// An administrator ended this session; the auth layer should log out
    SessionTerminated { reason: String },

    /// A resource was deactivated elsewhere; views showing it should close
    ResourceRemoved {
        resource_type: String,
        resource_id: String,
        message: String,
    },

    ConnectionStateChanged {
        channel: ChannelKind,
        state: ConnectionState,
    },

    /// Reconnect attempts ran out; live push is gone until the next session
    ChannelExhausted { channel: ChannelKind, attempts: u32 },
}

/// Bounded fan-out of [`SystemEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.sender.subscribe()
    }

    /// Publishing without subscribers is fine; the event is simply dropped
    pub fn publish(&self, event: SystemEvent) {
        if self.sender.send(event).is_err() {
            debug!("system event dropped: no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
