/// Normalized notifications for the host event sink
use crate::p2p::protocol::MessageKind;
use crate::p2p::registry::EndpointState;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Real-time events surfaced to the host UI/runtime layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    /// A nearby peer was discovered
    #[serde(rename_all = "camelCase")]
    PeerFound { peer_id: String, display_name: String },

    /// A previously discovered peer went out of range
    #[serde(rename_all = "camelCase")]
    PeerLost { peer_id: String },

    /// An endpoint moved through the connection state machine
    #[serde(rename_all = "camelCase")]
    ConnectionStateChanged {
        peer_id: String,
        display_name: String,
        state: EndpointState,
    },

    /// A message arrived from a connected peer
    #[serde(rename_all = "camelCase")]
    MessageReceived {
        peer_id: String,
        #[serde(rename = "type")]
        kind: MessageKind,
        content: String,
        timestamp: i64,
    },
}

/// Handle the core emits host events through.
///
/// Backed by a broadcast channel so any number of consumers (UI bridge,
/// logger, tests) can subscribe; emitting with no live subscribers is fine.
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<HostEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<HostEvent>) {
        let (tx, rx) = broadcast::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: HostEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("No host event subscribers, dropped {:?}", e.0);
        }
    }
}
