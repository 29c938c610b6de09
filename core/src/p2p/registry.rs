/// Endpoint tracking and connection state machine
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::warn;

/// Connection state of a remote endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndpointState {
    /// Seen in discovery, not yet negotiating
    Discovered,
    /// Connection requested or incoming request accepted
    Connecting,
    /// Fully connected, eligible for message fan-out
    Connected,
    /// Rejected, errored, or dropped by the transport
    Disconnected,
}

impl EndpointState {
    /// State machine legality. `Connected` is only reachable from
    /// `Connecting`; any state may fall to `Disconnected`; a disconnected
    /// endpoint may re-enter at `Discovered` on rediscovery. The
    /// `Connecting -> Connecting` self-loop covers unrecognized status codes
    /// that keep the endpoint negotiating.
    pub fn can_transition_to(self, next: EndpointState) -> bool {
        use EndpointState::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (Discovered, Connecting)
                | (Connecting, Connecting)
                | (Connecting, Connected)
                | (Disconnected, Discovered)
        )
    }
}

/// One tracked remote peer
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: String,
    pub display_name: String,
    pub state: EndpointState,
    pub discovered_at: Instant,
    pub connected_at: Option<Instant>,
}

impl Endpoint {
    fn new(id: String, display_name: String, state: EndpointState) -> Self {
        Self {
            id,
            display_name,
            state,
            discovered_at: Instant::now(),
            connected_at: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == EndpointState::Connected
    }
}

/// Exclusive owner of all endpoint records.
///
/// Discovery and connection callbacks can interleave; every read-modify-write
/// happens under one write lock so no sequence of callbacks can observe or
/// produce a half-applied transition.
#[derive(Clone)]
pub struct EndpointRegistry {
    endpoints: Arc<RwLock<HashMap<String, Endpoint>>>,
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self {
            endpoints: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a newly discovered endpoint. Returns the record if it was
    /// actually inserted (or re-entered from `Disconnected`); `None` for ids
    /// already tracked in an active state, so duplicate discovery callbacks
    /// stay idempotent.
    pub async fn insert_discovered(&self, id: &str, display_name: &str) -> Option<Endpoint> {
        let mut endpoints = self.endpoints.write().await;
        match endpoints.get_mut(id) {
            None => {
                let endpoint = Endpoint::new(
                    id.to_string(),
                    display_name.to_string(),
                    EndpointState::Discovered,
                );
                endpoints.insert(id.to_string(), endpoint.clone());
                Some(endpoint)
            }
            Some(endpoint) if endpoint.state == EndpointState::Disconnected => {
                endpoint.state = EndpointState::Discovered;
                endpoint.display_name = display_name.to_string();
                endpoint.discovered_at = Instant::now();
                endpoint.connected_at = None;
                Some(endpoint.clone())
            }
            Some(_) => None,
        }
    }

    /// Track an incoming connection. Unknown ids are inserted directly at
    /// `Connecting` (the discovery callback never fired on this side);
    /// `Discovered` and `Disconnected` ids move to `Connecting`. Returns
    /// `None` when the endpoint is already negotiating or connected.
    pub async fn mark_connecting(&self, id: &str, display_name: &str) -> Option<Endpoint> {
        let mut endpoints = self.endpoints.write().await;
        match endpoints.get_mut(id) {
            None => {
                let endpoint = Endpoint::new(
                    id.to_string(),
                    display_name.to_string(),
                    EndpointState::Connecting,
                );
                endpoints.insert(id.to_string(), endpoint.clone());
                Some(endpoint)
            }
            Some(endpoint)
                if matches!(
                    endpoint.state,
                    EndpointState::Discovered | EndpointState::Disconnected
                ) =>
            {
                endpoint.state = EndpointState::Connecting;
                Some(endpoint.clone())
            }
            Some(_) => None,
        }
    }

    /// Apply a state transition, enforcing the legality table. Returns the
    /// updated record, or `None` if the endpoint is unknown or the transition
    /// is illegal (logged, state untouched).
    pub async fn transition(&self, id: &str, next: EndpointState) -> Option<Endpoint> {
        let mut endpoints = self.endpoints.write().await;
        match endpoints.get_mut(id) {
            None => {
                warn!("Ignoring {:?} transition for unknown endpoint {}", next, id);
                None
            }
            Some(endpoint) => {
                if !endpoint.state.can_transition_to(next) {
                    warn!(
                        "Illegal transition {:?} -> {:?} for endpoint {}",
                        endpoint.state, next, id
                    );
                    return None;
                }
                endpoint.state = next;
                if next == EndpointState::Connected {
                    endpoint.connected_at = Some(Instant::now());
                }
                Some(endpoint.clone())
            }
        }
    }

    /// Drop an endpoint that went out of range before any connection was
    /// attempted. Endpoints past `Discovered` are left to the connection
    /// lifecycle callbacks.
    pub async fn remove_if_discovered(&self, id: &str) -> Option<Endpoint> {
        let mut endpoints = self.endpoints.write().await;
        if endpoints.get(id).map(|e| e.state) == Some(EndpointState::Discovered) {
            endpoints.remove(id)
        } else {
            None
        }
    }

    pub async fn get(&self, id: &str) -> Option<Endpoint> {
        let endpoints = self.endpoints.read().await;
        endpoints.get(id).cloned()
    }

    /// Derived Connected Set: exactly the ids whose state is `Connected`
    pub async fn connected_ids(&self) -> Vec<String> {
        let endpoints = self.endpoints.read().await;
        endpoints
            .values()
            .filter(|e| e.is_connected())
            .map(|e| e.id.clone())
            .collect()
    }

    /// Get all known endpoints
    pub async fn all(&self) -> Vec<Endpoint> {
        let endpoints = self.endpoints.read().await;
        endpoints.values().cloned().collect()
    }

    /// (connected, total) counts
    pub async fn counts(&self) -> (usize, usize) {
        let endpoints = self.endpoints.read().await;
        let connected = endpoints.values().filter(|e| e.is_connected()).count();
        (connected, endpoints.len())
    }

    /// Forget every endpoint (full session reset)
    pub async fn clear(&self) {
        let mut endpoints = self.endpoints.write().await;
        endpoints.clear();
    }
}
