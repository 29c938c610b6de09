/// In-process transport for demos and integration tests
use crate::error::{Result, StarError};
use crate::node::Node;
use crate::p2p::transport::{Transport, STATUS_OK};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

struct Registration {
    node: Node,
    local_name: String,
    advertising: Option<String>,
    discovering: Option<String>,
}

#[derive(Default)]
struct HubState {
    nodes: HashMap<String, Registration>,
    /// (acceptor, remote) pairs; a link comes up once both directions accept
    accepted: HashSet<(String, String)>,
    /// established links, stored in both directions
    connected: HashSet<(String, String)>,
}

/// Pairs nodes within one process, delivering discovery and connection
/// callbacks the way a radio SDK would: asynchronously, on spawned tasks.
/// Needs a running tokio runtime.
pub struct LoopbackHub {
    state: Mutex<HubState>,
}

impl LoopbackHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HubState::default()),
        })
    }

    /// Mint a transport handle with a fresh endpoint id. Attach the node
    /// built on top of it before starting advertising or discovery.
    pub fn endpoint(self: &Arc<Self>) -> LoopbackTransport {
        LoopbackTransport {
            hub: self.clone(),
            endpoint_id: Uuid::new_v4().to_string(),
        }
    }

    /// Register the node behind a transport handle so callbacks can reach it
    pub fn attach(&self, transport: &LoopbackTransport, node: Node) {
        let mut state = self.state();
        state.nodes.insert(
            transport.endpoint_id.clone(),
            Registration {
                node,
                local_name: String::new(),
                advertising: None,
                discovering: None,
            },
        );
    }

    /// Tear down an established link, notifying both sides
    pub fn drop_link(&self, a: &str, b: &str) {
        let mut state = self.state();
        let was_connected = state.connected.remove(&(a.to_string(), b.to_string()));
        state.connected.remove(&(b.to_string(), a.to_string()));
        state.accepted.remove(&(a.to_string(), b.to_string()));
        state.accepted.remove(&(b.to_string(), a.to_string()));
        if !was_connected {
            return;
        }
        let node_a = state.nodes.get(a).map(|r| r.node.clone());
        let node_b = state.nodes.get(b).map(|r| r.node.clone());
        drop(state);

        debug!("Dropping loopback link {} <-> {}", a, b);
        if let Some(node) = node_a {
            let remote = b.to_string();
            tokio::spawn(async move { node.on_disconnected(&remote).await });
        }
        if let Some(node) = node_b {
            let remote = a.to_string();
            tokio::spawn(async move { node.on_disconnected(&remote).await });
        }
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap()
    }
}

/// One endpoint's handle onto the hub
#[derive(Clone)]
pub struct LoopbackTransport {
    hub: Arc<LoopbackHub>,
    endpoint_id: String,
}

impl LoopbackTransport {
    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }
}

impl Transport for LoopbackTransport {
    fn start_advertising(&self, local_name: &str, service_id: &str) -> Result<()> {
        let mut state = self.hub.state();
        let watchers: Vec<Node> = state
            .nodes
            .iter()
            .filter(|(id, reg)| {
                *id != &self.endpoint_id && reg.discovering.as_deref() == Some(service_id)
            })
            .map(|(_, reg)| reg.node.clone())
            .collect();

        let reg = state
            .nodes
            .get_mut(&self.endpoint_id)
            .ok_or_else(|| StarError::Transport("Endpoint not attached to hub".to_string()))?;
        reg.local_name = local_name.to_string();
        reg.advertising = Some(service_id.to_string());
        drop(state);

        for watcher in watchers {
            let id = self.endpoint_id.clone();
            let name = local_name.to_string();
            tokio::spawn(async move { watcher.on_endpoint_found(&id, &name).await });
        }
        Ok(())
    }

    fn start_discovery(&self, service_id: &str) -> Result<()> {
        let mut state = self.hub.state();
        let advertisers: Vec<(String, String)> = state
            .nodes
            .iter()
            .filter(|(id, reg)| {
                *id != &self.endpoint_id && reg.advertising.as_deref() == Some(service_id)
            })
            .map(|(id, reg)| (id.clone(), reg.local_name.clone()))
            .collect();

        let reg = state
            .nodes
            .get_mut(&self.endpoint_id)
            .ok_or_else(|| StarError::Transport("Endpoint not attached to hub".to_string()))?;
        reg.discovering = Some(service_id.to_string());
        let me = reg.node.clone();
        drop(state);

        for (id, name) in advertisers {
            let me = me.clone();
            tokio::spawn(async move { me.on_endpoint_found(&id, &name).await });
        }
        Ok(())
    }

    fn stop_advertising(&self) -> Result<()> {
        let mut state = self.hub.state();
        if let Some(reg) = state.nodes.get_mut(&self.endpoint_id) {
            reg.advertising = None;
        }
        Ok(())
    }

    fn stop_discovery(&self) -> Result<()> {
        let mut state = self.hub.state();
        if let Some(reg) = state.nodes.get_mut(&self.endpoint_id) {
            reg.discovering = None;
        }
        Ok(())
    }

    fn request_connection(&self, local_name: &str, endpoint_id: &str) -> Result<()> {
        let state = self.hub.state();
        let target = state
            .nodes
            .get(endpoint_id)
            .ok_or_else(|| StarError::Transport(format!("Unknown endpoint {}", endpoint_id)))?;
        let target_node = target.node.clone();
        let target_name = if target.local_name.is_empty() {
            endpoint_id.to_string()
        } else {
            target.local_name.clone()
        };
        let requester_node = state
            .nodes
            .get(&self.endpoint_id)
            .ok_or_else(|| StarError::Transport("Endpoint not attached to hub".to_string()))?
            .node
            .clone();
        drop(state);

        // Both sides see the initiation, as the real SDK does
        let requester_id = self.endpoint_id.clone();
        let requester_name = local_name.to_string();
        tokio::spawn(async move {
            target_node
                .on_connection_initiated(&requester_id, &requester_name)
                .await
        });

        let remote_id = endpoint_id.to_string();
        tokio::spawn(async move {
            requester_node
                .on_connection_initiated(&remote_id, &target_name)
                .await
        });
        Ok(())
    }

    fn accept_connection(&self, endpoint_id: &str) -> Result<()> {
        let mut state = self.hub.state();
        let remote_node = state
            .nodes
            .get(endpoint_id)
            .ok_or_else(|| StarError::Transport(format!("Unknown endpoint {}", endpoint_id)))?
            .node
            .clone();
        let my_node = state
            .nodes
            .get(&self.endpoint_id)
            .ok_or_else(|| StarError::Transport("Endpoint not attached to hub".to_string()))?
            .node
            .clone();

        state
            .accepted
            .insert((self.endpoint_id.clone(), endpoint_id.to_string()));
        let mutual = state
            .accepted
            .contains(&(endpoint_id.to_string(), self.endpoint_id.clone()));
        let already_up = state
            .connected
            .contains(&(self.endpoint_id.clone(), endpoint_id.to_string()));
        if !mutual || already_up {
            return Ok(());
        }

        state
            .connected
            .insert((self.endpoint_id.clone(), endpoint_id.to_string()));
        state
            .connected
            .insert((endpoint_id.to_string(), self.endpoint_id.clone()));
        drop(state);

        debug!("Loopback link up {} <-> {}", self.endpoint_id, endpoint_id);
        let local_id = self.endpoint_id.clone();
        let remote_id = endpoint_id.to_string();
        tokio::spawn(async move { my_node.on_connection_result(&remote_id, STATUS_OK).await });
        tokio::spawn(async move { remote_node.on_connection_result(&local_id, STATUS_OK).await });
        Ok(())
    }

    fn send_payload(&self, endpoint_id: &str, payload: Bytes) -> Result<()> {
        let state = self.hub.state();
        if !state
            .connected
            .contains(&(self.endpoint_id.clone(), endpoint_id.to_string()))
        {
            return Err(StarError::Transport(format!(
                "Not connected to {}",
                endpoint_id
            )));
        }
        let target = state
            .nodes
            .get(endpoint_id)
            .ok_or_else(|| StarError::Transport(format!("Unknown endpoint {}", endpoint_id)))?
            .node
            .clone();
        drop(state);

        let from = self.endpoint_id.clone();
        tokio::spawn(async move { target.on_payload_received(&from, &payload).await });
        Ok(())
    }
}
