/// StarChat demo - two in-process nodes chatting over the loopback transport
use starchat_core::events::{EventSink, HostEvent};
use starchat_core::p2p::loopback::LoopbackHub;
use starchat_core::p2p::registry::EndpointState;
use starchat_core::{Config, Node};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let room = config.room.clone();

    info!("🚀 Starting StarChat loopback demo in room '{}'", room);

    let hub = LoopbackHub::new();
    let (alice, mut alice_events) = spawn_node(&hub, "alice", &config);
    let (bob, mut bob_events) = spawn_node(&hub, "bob", &config);

    // Both sides advertise and browse: star strategy, either may initiate
    alice.start_advertising(&room)?;
    bob.start_advertising(&room)?;
    alice.start_browsing(&room)?;
    bob.start_browsing(&room)?;

    wait_for_connected(&mut alice_events).await?;
    wait_for_connected(&mut bob_events).await?;

    let outcome = alice.send_message("hello from alice").await?;
    info!("alice broadcast accepted for {} peer(s)", outcome.delivered());
    print_next_message(&mut bob_events, "bob").await?;

    let outcome = bob.send_message("hi alice, loud and clear").await?;
    info!("bob broadcast accepted for {} peer(s)", outcome.delivered());
    print_next_message(&mut alice_events, "alice").await?;

    let (connected, total) = alice.status().await;
    info!("alice sees {}/{} tracked peers connected", connected, total);

    alice.stop().await?;
    bob.stop().await?;
    info!("Demo finished");
    Ok(())
}

fn spawn_node(
    hub: &Arc<LoopbackHub>,
    name: &str,
    config: &Config,
) -> (Node, broadcast::Receiver<HostEvent>) {
    let (events, rx) = EventSink::new(64);
    let transport = hub.endpoint();
    let node_config = Config {
        display_name: name.to_string(),
        ..config.clone()
    };
    let node = Node::new(node_config, Arc::new(transport.clone()), events);
    hub.attach(&transport, node.clone());
    (node, rx)
}

async fn wait_for_connected(events: &mut broadcast::Receiver<HostEvent>) -> anyhow::Result<()> {
    loop {
        let event = timeout(Duration::from_secs(5), events.recv()).await??;
        if let HostEvent::ConnectionStateChanged {
            display_name,
            state: EndpointState::Connected,
            ..
        } = event
        {
            info!("Connected to {}", display_name);
            return Ok(());
        }
    }
}

async fn print_next_message(
    events: &mut broadcast::Receiver<HostEvent>,
    who: &str,
) -> anyhow::Result<()> {
    loop {
        let event = timeout(Duration::from_secs(5), events.recv()).await??;
        if let HostEvent::MessageReceived {
            peer_id, content, ..
        } = event
        {
            info!("{} received a message from {}: {}", who, peer_id, content);
            return Ok(());
        }
    }
}
