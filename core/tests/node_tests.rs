/// Scenario tests for the connection orchestrator, registry, and broadcast
/// dispatcher, driven through the transport callback surface.

// In integration tests, the package is available as an external crate
extern crate starchat_core;

use bytes::Bytes;
use starchat_core::events::{EventSink, HostEvent};
use starchat_core::p2p::image::{ImageTranscoder, MAX_IMAGE_BYTES};
use starchat_core::p2p::loopback::LoopbackHub;
use starchat_core::p2p::protocol::{Envelope, MessageKind};
use starchat_core::p2p::registry::EndpointState;
use starchat_core::p2p::transport::{Transport, STATUS_CONNECTION_REJECTED, STATUS_OK};
use starchat_core::{Config, Node, Result, StarError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

/// Transport double that records every call and can be told to reject
/// deliveries to specific endpoints
#[derive(Default)]
struct RecordingTransport {
    requested: Mutex<Vec<String>>,
    accepted: Mutex<Vec<String>>,
    sent: Mutex<Vec<(String, Bytes)>>,
    rejected_targets: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    fn reject_deliveries_to(&self, endpoint_id: &str) {
        self.rejected_targets
            .lock()
            .unwrap()
            .insert(endpoint_id.to_string());
    }

    fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    fn accepted(&self) -> Vec<String> {
        self.accepted.lock().unwrap().clone()
    }

    fn sent(&self) -> Vec<(String, Bytes)> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_targets(&self) -> HashSet<String> {
        self.sent().into_iter().map(|(id, _)| id).collect()
    }
}

impl Transport for RecordingTransport {
    fn start_advertising(&self, _local_name: &str, _service_id: &str) -> Result<()> {
        Ok(())
    }

    fn start_discovery(&self, _service_id: &str) -> Result<()> {
        Ok(())
    }

    fn stop_advertising(&self) -> Result<()> {
        Ok(())
    }

    fn stop_discovery(&self) -> Result<()> {
        Ok(())
    }

    fn request_connection(&self, _local_name: &str, endpoint_id: &str) -> Result<()> {
        self.requested.lock().unwrap().push(endpoint_id.to_string());
        Ok(())
    }

    fn accept_connection(&self, endpoint_id: &str) -> Result<()> {
        self.accepted.lock().unwrap().push(endpoint_id.to_string());
        Ok(())
    }

    fn send_payload(&self, endpoint_id: &str, payload: Bytes) -> Result<()> {
        if self.rejected_targets.lock().unwrap().contains(endpoint_id) {
            return Err(StarError::Transport(format!(
                "Injected delivery failure for {}",
                endpoint_id
            )));
        }
        self.sent
            .lock()
            .unwrap()
            .push((endpoint_id.to_string(), payload));
        Ok(())
    }
}

fn test_node() -> (Node, Arc<RecordingTransport>, broadcast::Receiver<HostEvent>) {
    let transport = Arc::new(RecordingTransport::default());
    let (events, rx) = EventSink::new(64);
    let node = Node::new(Config::default(), transport.clone(), events);
    (node, transport, rx)
}

/// Drive an endpoint through discovery and a successful connection
async fn connect(node: &Node, id: &str, name: &str) {
    node.on_endpoint_found(id, name).await;
    node.on_connection_result(id, STATUS_OK).await;
}

/// Collect every event already emitted (callbacks are synchronous, so after
/// awaiting a callback its events are in the channel)
fn drain(rx: &mut broadcast::Receiver<HostEvent>) -> Vec<HostEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn test_discover_connect_and_send_to_single_peer() {
    let (node, transport, mut rx) = test_node();

    node.on_endpoint_found("E1", "Pixel 6").await;
    assert_eq!(transport.requested(), vec!["E1".to_string()]);
    assert_eq!(
        drain(&mut rx),
        vec![
            HostEvent::PeerFound {
                peer_id: "E1".to_string(),
                display_name: "Pixel 6".to_string(),
            },
            HostEvent::ConnectionStateChanged {
                peer_id: "E1".to_string(),
                display_name: "Pixel 6".to_string(),
                state: EndpointState::Connecting,
            },
        ]
    );

    node.on_connection_result("E1", STATUS_OK).await;
    assert_eq!(
        drain(&mut rx),
        vec![HostEvent::ConnectionStateChanged {
            peer_id: "E1".to_string(),
            display_name: "Pixel 6".to_string(),
            state: EndpointState::Connected,
        }]
    );
    assert_eq!(node.connected_peers().await, vec!["E1".to_string()]);

    let outcome = node.send_message("hi").await.unwrap();
    assert_eq!(outcome.attempted, 1);
    assert!(outcome.is_complete());

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "E1");
    let envelope = Envelope::from_bytes(&sent[0].1).unwrap();
    assert_eq!(envelope.kind, MessageKind::Text);
    assert_eq!(envelope.content, "hi");
}

#[tokio::test]
async fn test_broadcast_reaches_every_connected_peer() {
    let (node, transport, _rx) = test_node();
    connect(&node, "E1", "Phone").await;
    connect(&node, "E2", "Tablet").await;

    let outcome = node.send_message("x").await.unwrap();
    assert_eq!(outcome.attempted, 2);
    assert!(outcome.is_complete());
    assert_eq!(
        transport.sent_targets(),
        HashSet::from(["E1".to_string(), "E2".to_string()])
    );
}

#[tokio::test]
async fn test_broadcast_failure_does_not_block_others() {
    let (node, transport, _rx) = test_node();
    connect(&node, "E1", "Phone").await;
    connect(&node, "E2", "Tablet").await;
    connect(&node, "E3", "Laptop").await;
    transport.reject_deliveries_to("E2");

    let outcome = node.send_message("x").await.unwrap();
    assert_eq!(outcome.attempted, 3);
    assert_eq!(outcome.delivered(), 2);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0, "E2");
    assert_eq!(
        transport.sent_targets(),
        HashSet::from(["E1".to_string(), "E3".to_string()])
    );
}

#[tokio::test]
async fn test_broadcast_with_no_peers_is_noop_success() {
    let (node, transport, _rx) = test_node();
    let outcome = node.send_message("into the void").await.unwrap();
    assert_eq!(outcome.attempted, 0);
    assert!(outcome.is_complete());
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_rejected_connection_goes_disconnected() {
    let (node, _transport, mut rx) = test_node();
    node.on_endpoint_found("E1", "Phone").await;
    drain(&mut rx);

    node.on_connection_result("E1", STATUS_CONNECTION_REJECTED).await;
    assert_eq!(
        drain(&mut rx),
        vec![HostEvent::ConnectionStateChanged {
            peer_id: "E1".to_string(),
            display_name: "Phone".to_string(),
            state: EndpointState::Disconnected,
        }]
    );
    assert!(node.connected_peers().await.is_empty());

    // Absent from fan-out from now on
    let outcome = node.send_message("x").await.unwrap();
    assert_eq!(outcome.attempted, 0);
}

#[tokio::test]
async fn test_unknown_status_keeps_negotiating() {
    let (node, _transport, mut rx) = test_node();
    node.on_endpoint_found("E1", "Phone").await;
    drain(&mut rx);

    node.on_connection_result("E1", 9999).await;
    assert_eq!(
        drain(&mut rx),
        vec![HostEvent::ConnectionStateChanged {
            peer_id: "E1".to_string(),
            display_name: "Phone".to_string(),
            state: EndpointState::Connecting,
        }]
    );
    assert!(node.connected_peers().await.is_empty());

    // A later definitive status still lands
    node.on_connection_result("E1", STATUS_OK).await;
    assert_eq!(node.connected_peers().await, vec!["E1".to_string()]);
}

#[tokio::test]
async fn test_duplicate_discovery_is_ignored() {
    let (node, transport, mut rx) = test_node();
    node.on_endpoint_found("E1", "Phone").await;
    drain(&mut rx);

    node.on_endpoint_found("E1", "Phone").await;
    assert_eq!(transport.requested().len(), 1);
    assert!(drain(&mut rx).is_empty());

    node.on_connection_result("E1", STATUS_OK).await;
    node.on_endpoint_found("E1", "Phone").await;
    assert_eq!(transport.requested().len(), 1);
}

#[tokio::test]
async fn test_result_for_unknown_endpoint_is_harmless() {
    let (node, _transport, mut rx) = test_node();
    node.on_connection_result("GHOST", STATUS_OK).await;
    assert!(drain(&mut rx).is_empty());
    assert!(node.connected_peers().await.is_empty());
}

#[tokio::test]
async fn test_incoming_connection_auto_accepted() {
    let (node, transport, mut rx) = test_node();

    node.on_connection_initiated("E9", "Tablet").await;
    assert_eq!(transport.accepted(), vec!["E9".to_string()]);
    assert_eq!(
        drain(&mut rx),
        vec![HostEvent::ConnectionStateChanged {
            peer_id: "E9".to_string(),
            display_name: "Tablet".to_string(),
            state: EndpointState::Connecting,
        }]
    );

    node.on_connection_result("E9", STATUS_OK).await;
    assert_eq!(node.connected_peers().await, vec!["E9".to_string()]);
}

#[tokio::test]
async fn test_disconnect_removes_from_connected_set() {
    let (node, _transport, mut rx) = test_node();
    connect(&node, "E1", "Phone").await;
    drain(&mut rx);

    node.on_disconnected("E1").await;
    assert_eq!(
        drain(&mut rx),
        vec![HostEvent::ConnectionStateChanged {
            peer_id: "E1".to_string(),
            display_name: "Phone".to_string(),
            state: EndpointState::Disconnected,
        }]
    );
    assert!(node.connected_peers().await.is_empty());
}

#[tokio::test]
async fn test_endpoint_lost_fires_event() {
    let (node, _transport, mut rx) = test_node();
    connect(&node, "E1", "Phone").await;
    drain(&mut rx);

    // Lost callbacks concern discovery; a connected endpoint stays tracked
    node.on_endpoint_lost("E1").await;
    assert_eq!(
        drain(&mut rx),
        vec![HostEvent::PeerLost {
            peer_id: "E1".to_string(),
        }]
    );
    assert_eq!(node.connected_peers().await, vec!["E1".to_string()]);

    // Unknown ids are fine too
    node.on_endpoint_lost("GHOST").await;
    assert_eq!(
        drain(&mut rx),
        vec![HostEvent::PeerLost {
            peer_id: "GHOST".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_malformed_payload_dropped_silently() {
    let (node, _transport, mut rx) = test_node();
    connect(&node, "E1", "Phone").await;
    drain(&mut rx);

    node.on_payload_received("E1", b"{not an envelope").await;
    node.on_payload_received("E1", br#"{"type":"video","content":"x","timestamp":1}"#)
        .await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_payload_received_surfaces_message() {
    let (node, _transport, mut rx) = test_node();
    let payload = Envelope::text("yo").with_timestamp(5).to_bytes().unwrap();

    node.on_payload_received("E1", &payload).await;
    assert_eq!(
        drain(&mut rx),
        vec![HostEvent::MessageReceived {
            peer_id: "E1".to_string(),
            kind: MessageKind::Text,
            content: "yo".to_string(),
            timestamp: 5,
        }]
    );
}

// ─── Image sends ─────────────────────────────────────────────────────────────

use base64::{engine::general_purpose, Engine as _};

struct InflatingTranscoder {
    output_len: usize,
}

impl ImageTranscoder for InflatingTranscoder {
    fn transcode(&self, _raw: &[u8], _quality: u8) -> Result<Vec<u8>> {
        Ok(vec![0u8; self.output_len])
    }
}

#[tokio::test]
async fn test_send_image_round_trip() {
    let (node, transport, _rx) = test_node();
    connect(&node, "E1", "Phone").await;

    let raw = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x01, 0x02, 0x03, 0x04];
    let input = general_purpose::STANDARD.encode(&raw);
    let outcome = node.send_image(&input).await.unwrap();
    assert_eq!(outcome.attempted, 1);
    assert!(outcome.is_complete());

    let sent = transport.sent();
    let envelope = Envelope::from_bytes(&sent[0].1).unwrap();
    assert_eq!(envelope.kind, MessageKind::Image);
    assert_eq!(envelope.image_bytes().unwrap(), raw);
}

#[tokio::test]
async fn test_send_image_rejects_undecodable_input() {
    let (node, _transport, _rx) = test_node();

    let not_an_image = general_purpose::STANDARD.encode(b"just some text");
    assert!(matches!(
        node.send_image(&not_an_image).await,
        Err(StarError::InvalidImage(_))
    ));

    assert!(matches!(
        node.send_image("%%% not base64 %%%").await,
        Err(StarError::InvalidImage(_))
    ));
}

#[tokio::test]
async fn test_send_image_rejects_oversized_result() {
    let transport = Arc::new(RecordingTransport::default());
    let (events, _rx) = EventSink::new(64);
    let node = Node::new(Config::default(), transport.clone(), events).with_transcoder(Arc::new(
        InflatingTranscoder {
            output_len: MAX_IMAGE_BYTES + 1,
        },
    ));
    connect(&node, "E1", "Phone").await;

    let input = general_purpose::STANDARD.encode([0u8; 64]);
    let err = node.send_image(&input).await.unwrap_err();
    assert!(matches!(err, StarError::ImageTooLarge { .. }));
    // Nothing reached the wire
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_stop_is_idempotent_and_clears_session() {
    let (node, _transport, _rx) = test_node();
    connect(&node, "E1", "Phone").await;
    connect(&node, "E2", "Tablet").await;

    node.stop().await.unwrap();
    assert!(node.peers().await.is_empty());
    assert!(node.connected_peers().await.is_empty());

    node.stop().await.unwrap();
    assert!(node.peers().await.is_empty());
}

// ─── Loopback end-to-end ─────────────────────────────────────────────────────

fn loopback_node(
    hub: &Arc<LoopbackHub>,
    name: &str,
) -> (Node, broadcast::Receiver<HostEvent>) {
    let (events, rx) = EventSink::new(64);
    let transport = hub.endpoint();
    let config = Config {
        display_name: name.to_string(),
        ..Config::default()
    };
    let node = Node::new(config, Arc::new(transport.clone()), events);
    hub.attach(&transport, node.clone());
    (node, rx)
}

async fn wait_for(
    rx: &mut broadcast::Receiver<HostEvent>,
    mut pred: impl FnMut(&HostEvent) -> bool,
) -> HostEvent {
    loop {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if pred(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn test_loopback_session_end_to_end() {
    let hub = LoopbackHub::new();
    let (alice, mut alice_rx) = loopback_node(&hub, "alice");
    let (bob, mut bob_rx) = loopback_node(&hub, "bob");

    alice.start_advertising("kitchen").unwrap();
    bob.start_advertising("kitchen").unwrap();
    alice.start_browsing("kitchen").unwrap();
    bob.start_browsing("kitchen").unwrap();

    wait_for(&mut alice_rx, |e| {
        matches!(
            e,
            HostEvent::ConnectionStateChanged {
                state: EndpointState::Connected,
                ..
            }
        )
    })
    .await;
    wait_for(&mut bob_rx, |e| {
        matches!(
            e,
            HostEvent::ConnectionStateChanged {
                state: EndpointState::Connected,
                ..
            }
        )
    })
    .await;

    assert_eq!(alice.connected_peers().await.len(), 1);
    assert_eq!(bob.connected_peers().await.len(), 1);

    let outcome = alice.send_message("hello bob").await.unwrap();
    assert_eq!(outcome.attempted, 1);

    let received = wait_for(&mut bob_rx, |e| {
        matches!(e, HostEvent::MessageReceived { .. })
    })
    .await;
    match received {
        HostEvent::MessageReceived { kind, content, .. } => {
            assert_eq!(kind, MessageKind::Text);
            assert_eq!(content, "hello bob");
        }
        other => panic!("unexpected event: {:?}", other),
    }

    alice.stop().await.unwrap();
    bob.stop().await.unwrap();
    assert!(alice.peers().await.is_empty());
}
