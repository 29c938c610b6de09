/// Fan-out of encoded envelopes to every connected endpoint
use crate::p2p::registry::EndpointRegistry;
use crate::p2p::transport::Transport;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-call result of a broadcast: how many endpoints were attempted and
/// which deliveries the transport rejected.
#[derive(Debug, Default)]
pub struct BroadcastOutcome {
    pub attempted: usize,
    /// (endpoint id, transport error) per failed delivery
    pub failed: Vec<(String, String)>,
}

impl BroadcastOutcome {
    pub fn delivered(&self) -> usize {
        self.attempted - self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sends one logical message independently to every connected endpoint
#[derive(Clone)]
pub struct Broadcaster {
    registry: EndpointRegistry,
    transport: Arc<dyn Transport>,
}

impl Broadcaster {
    pub fn new(registry: EndpointRegistry, transport: Arc<dyn Transport>) -> Self {
        Self { registry, transport }
    }

    /// Deliver `payload` to every id in the Connected Set. Sending to nobody
    /// is a valid no-op; a failure for one endpoint is recorded and never
    /// aborts delivery to the others.
    pub async fn broadcast(&self, payload: Bytes) -> BroadcastOutcome {
        let targets = self.registry.connected_ids().await;
        let mut outcome = BroadcastOutcome {
            attempted: targets.len(),
            failed: Vec::new(),
        };

        if targets.is_empty() {
            debug!("Broadcast with no connected endpoints");
            return outcome;
        }

        for endpoint_id in targets {
            if let Err(e) = self.transport.send_payload(&endpoint_id, payload.clone()) {
                warn!("Failed to deliver payload to {}: {}", endpoint_id, e);
                outcome.failed.push((endpoint_id, e.to_string()));
            }
        }

        debug!(
            "Broadcast complete: {}/{} deliveries accepted",
            outcome.delivered(),
            outcome.attempted
        );
        outcome
    }
}
