/// Connection orchestration and the caller-facing command surface
use crate::config::Config;
use crate::error::{Result, StarError};
use crate::events::{EventSink, HostEvent};
use crate::p2p::broadcast::{BroadcastOutcome, Broadcaster};
use crate::p2p::image::{ImagePolicy, ImageTranscoder, SniffTranscoder};
use crate::p2p::protocol::Envelope;
use crate::p2p::registry::{Endpoint, EndpointRegistry, EndpointState};
use crate::p2p::transport::{
    Transport, STATUS_CONNECTION_REJECTED, STATUS_ERROR, STATUS_OK,
};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// One local participant in a star-topology session.
///
/// Owns the endpoint registry and bridges transport callbacks to registry
/// transitions and host events. The node plays advertiser and discoverer
/// simultaneously, so either side may initiate a connection.
#[derive(Clone)]
pub struct Node {
    config: Config,
    registry: EndpointRegistry,
    transport: Arc<dyn Transport>,
    broadcaster: Broadcaster,
    image_policy: ImagePolicy,
    events: EventSink,
}

impl Node {
    pub fn new(config: Config, transport: Arc<dyn Transport>, events: EventSink) -> Self {
        let registry = EndpointRegistry::new();
        let broadcaster = Broadcaster::new(registry.clone(), transport.clone());

        info!("Created node '{}'", config.display_name);

        Self {
            config,
            registry,
            transport,
            broadcaster,
            image_policy: ImagePolicy::new(Arc::new(SniffTranscoder)),
            events,
        }
    }

    /// Swap in a host-provided pixel codec
    pub fn with_transcoder(mut self, transcoder: Arc<dyn ImageTranscoder>) -> Self {
        self.image_policy = ImagePolicy::new(transcoder);
        self
    }

    // ─── Command surface ─────────────────────────────────────────────────────

    /// Advertise this node in `room`. Reports accept/reject of the request
    /// itself; connection outcomes arrive via the event stream.
    pub fn start_advertising(&self, room: &str) -> Result<()> {
        info!(
            "Advertising as '{}' in room '{}'",
            self.config.display_name, room
        );
        self.transport.start_advertising(&self.config.display_name, room)
    }

    /// Start discovering peers advertising in `room`
    pub fn start_browsing(&self, room: &str) -> Result<()> {
        info!("Browsing room '{}'", room);
        self.transport.start_discovery(room)
    }

    /// Broadcast a text message to every connected peer
    pub async fn send_message(&self, text: &str) -> Result<BroadcastOutcome> {
        let payload = Envelope::text(text).to_bytes()?;
        Ok(self.broadcaster.broadcast(payload).await)
    }

    /// Compress and broadcast an image. Input is base64, matching the host
    /// bridge convention; the compressed result must fit the wire budget.
    pub async fn send_image(&self, base64_image: &str) -> Result<BroadcastOutcome> {
        let raw = general_purpose::STANDARD
            .decode(base64_image.trim())
            .map_err(|e| StarError::InvalidImage(format!("Invalid base64 input: {}", e)))?;
        let compressed = self.image_policy.prepare(&raw)?;
        let payload = Envelope::image(&compressed).to_bytes()?;
        Ok(self.broadcaster.broadcast(payload).await)
    }

    /// Stop advertising and discovery and forget every endpoint. Idempotent;
    /// this is a full session reset, not a partial teardown.
    pub async fn stop(&self) -> Result<()> {
        if let Err(e) = self.transport.stop_advertising() {
            warn!("Failed to stop advertising: {}", e);
        }
        if let Err(e) = self.transport.stop_discovery() {
            warn!("Failed to stop discovery: {}", e);
        }
        self.registry.clear().await;
        info!("Session stopped, endpoint registry cleared");
        Ok(())
    }

    /// Ids currently eligible for message fan-out
    pub async fn connected_peers(&self) -> Vec<String> {
        self.registry.connected_ids().await
    }

    /// Snapshot of every tracked endpoint
    pub async fn peers(&self) -> Vec<Endpoint> {
        self.registry.all().await
    }

    /// (connected, total) peer counts
    pub async fn status(&self) -> (usize, usize) {
        self.registry.counts().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    // ─── Transport callback surface ──────────────────────────────────────────

    /// Discovery callback. New endpoints get a connection request
    /// immediately (star strategy); duplicates for an endpoint already
    /// negotiating or connected are ignored.
    pub async fn on_endpoint_found(&self, endpoint_id: &str, display_name: &str) {
        let Some(endpoint) = self.registry.insert_discovered(endpoint_id, display_name).await
        else {
            debug!("Duplicate discovery of {}, already tracked", endpoint_id);
            return;
        };

        info!("Discovered endpoint {} ({})", endpoint.id, endpoint.display_name);
        self.events.emit(HostEvent::PeerFound {
            peer_id: endpoint.id.clone(),
            display_name: endpoint.display_name.clone(),
        });

        self.apply_transition(endpoint_id, EndpointState::Connecting).await;
        if let Err(e) = self
            .transport
            .request_connection(&self.config.display_name, endpoint_id)
        {
            warn!("Connection request to {} failed: {}", endpoint_id, e);
            self.apply_transition(endpoint_id, EndpointState::Disconnected).await;
        }
    }

    /// Lost-endpoint callback. Only endpoints still in `Discovered` are
    /// dropped here; the connection lifecycle callbacks own the rest. The
    /// peer-lost event fires unconditionally.
    pub async fn on_endpoint_lost(&self, endpoint_id: &str) {
        if self.registry.remove_if_discovered(endpoint_id).await.is_some() {
            debug!("Removed lost endpoint {}", endpoint_id);
        }
        info!("Lost endpoint {}", endpoint_id);
        self.events.emit(HostEvent::PeerLost {
            peer_id: endpoint_id.to_string(),
        });
    }

    /// Incoming connection request: always accepted. Open sessions are the
    /// deliberate policy, there is no user-mediated approval step. Pass the
    /// endpoint id as `display_name` when the transport has no better label.
    pub async fn on_connection_initiated(&self, endpoint_id: &str, display_name: &str) {
        // Track before accepting: the accept can complete the link and the
        // resulting status callback needs the endpoint to already be
        // Connecting
        if let Some(endpoint) = self.registry.mark_connecting(endpoint_id, display_name).await {
            debug!("Negotiating with {} ({})", endpoint.id, endpoint.display_name);
            self.emit_state(&endpoint);
        }
        if let Err(e) = self.transport.accept_connection(endpoint_id) {
            warn!("Failed to accept connection from {}: {}", endpoint_id, e);
            self.apply_transition(endpoint_id, EndpointState::Disconnected).await;
        }
    }

    /// Connection resolution callback
    pub async fn on_connection_result(&self, endpoint_id: &str, status_code: i32) {
        let next = match status_code {
            STATUS_OK => EndpointState::Connected,
            STATUS_CONNECTION_REJECTED | STATUS_ERROR => EndpointState::Disconnected,
            other => {
                // Unmapped codes keep the endpoint negotiating rather than
                // silently dropping it
                warn!("Unmapped connection status {} for {}", other, endpoint_id);
                EndpointState::Connecting
            }
        };
        self.apply_transition(endpoint_id, next).await;
    }

    /// Transport-level disconnect
    pub async fn on_disconnected(&self, endpoint_id: &str) {
        self.apply_transition(endpoint_id, EndpointState::Disconnected).await;
    }

    /// Inbound payload: validate, classify, surface. Malformed payloads are
    /// logged and dropped without an event.
    pub async fn on_payload_received(&self, endpoint_id: &str, payload: &[u8]) {
        match Envelope::from_bytes(payload) {
            Ok(envelope) => {
                debug!("Received {} message from {}", envelope.kind, endpoint_id);
                self.events.emit(HostEvent::MessageReceived {
                    peer_id: endpoint_id.to_string(),
                    kind: envelope.kind,
                    content: envelope.content,
                    timestamp: envelope.timestamp,
                });
            }
            Err(e) => warn!("Dropping malformed payload from {}: {}", endpoint_id, e),
        }
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    async fn apply_transition(&self, endpoint_id: &str, next: EndpointState) {
        if let Some(endpoint) = self.registry.transition(endpoint_id, next).await {
            info!("Endpoint {} -> {:?}", endpoint.id, endpoint.state);
            self.emit_state(&endpoint);
        }
    }

    fn emit_state(&self, endpoint: &Endpoint) {
        self.events.emit(HostEvent::ConnectionStateChanged {
            peer_id: endpoint.id.clone(),
            display_name: endpoint.display_name.clone(),
            state: endpoint.state,
        });
    }
}
