//! # Integration Harness
//!
//! Helpers shared by the integration tests. A "process" here is a
//! `ChannelManager`; keep it alive for as long as its handles are used.

pub mod election;
pub mod failover;
pub mod fan_out;

use hostcast::{
    ChannelEvent, ChannelHandle, ChannelManager, Coordinator, CoordinatorState, RelayConfig,
};
use shared_bus::{EventFilter, EventSubscriber, EventTopic, RelayEvent, Subscription};
use shared_types::RendezvousAddress;
use std::time::Duration;
use tokio::time::timeout;

/// Upper bound for anything that involves an election round.
pub const WAIT: Duration = Duration::from_secs(10);

/// How long a handle must stay silent to count as having received nothing.
pub const QUIET: Duration = Duration::from_millis(150);

/// An address on a port nobody is listening on.
pub async fn free_address() -> RendezvousAddress {
    let probe = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe");
    RendezvousAddress::localhost(probe.local_addr().expect("probe addr").port())
}

/// A fresh simulated process using `address` by default.
pub fn process(address: &RendezvousAddress) -> ChannelManager {
    ChannelManager::new(RelayConfig {
        default_address: address.clone(),
        ..RelayConfig::default()
    })
}

/// Connection events (peer joined/left, hub found/lost) of one process.
pub fn connection_events(manager: &ChannelManager) -> Subscription {
    manager
        .events()
        .subscribe(EventFilter::topics(vec![EventTopic::Connection]))
}

pub async fn wait_for_state(coordinator: &Coordinator, state: CoordinatorState) {
    let mut changes = coordinator.state_changes();
    timeout(WAIT, changes.wait_for(|current| *current == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}"))
        .expect("coordinator stopped");
}

/// Wait until the coordinator holds either role.
pub async fn wait_for_role(coordinator: &Coordinator) -> CoordinatorState {
    let mut changes = coordinator.state_changes();
    let state = *timeout(WAIT, changes.wait_for(CoordinatorState::is_connected))
        .await
        .expect("timed out waiting for a role")
        .expect("coordinator stopped");
    state
}

/// Wait for the next `PeerConnected` on a connection subscription.
pub async fn peer_connected(events: &mut Subscription) {
    timeout(WAIT, async {
        while let Some(event) = events.recv().await {
            if matches!(event, RelayEvent::PeerConnected { .. }) {
                return;
            }
        }
        panic!("event bus closed");
    })
    .await
    .expect("timed out waiting for a peer");
}

/// Next message on `handle`. Any other event fails the test.
pub async fn next_message(handle: &mut ChannelHandle) -> String {
    match timeout(WAIT, handle.recv()).await.expect("timed out waiting for a message") {
        Some(ChannelEvent::Message(text)) => text,
        other => panic!("expected a message, got {other:?}"),
    }
}

/// The next `count` messages on `handle`, sorted.
pub async fn messages(handle: &mut ChannelHandle, count: usize) -> Vec<String> {
    let mut received = Vec::with_capacity(count);
    for _ in 0..count {
        received.push(next_message(handle).await);
    }
    received.sort();
    received
}

/// Assert nothing more arrives on `handle` for a while.
pub async fn assert_quiet(handle: &mut ChannelHandle) {
    tokio::time::sleep(QUIET).await;
    if let Some(event) = handle.try_recv() {
        panic!("expected silence on {}, got {event:?}", handle.name());
    }
}

/// One hub process and `peers` peer processes, each with one open handle
/// on `channel`, with every peer known to the hub.
pub struct Cluster {
    pub address: RendezvousAddress,
    pub processes: Vec<ChannelManager>,
    pub handles: Vec<ChannelHandle>,
}

impl Cluster {
    pub async fn start(peers: usize, channel: &str) -> Self {
        let address = free_address().await;

        let hub = process(&address);
        let mut joined = connection_events(&hub);
        let hub_handle = hub.create_channel(channel).expect("hub channel");
        wait_for_state(hub_handle.coordinator(), CoordinatorState::Server).await;

        let mut processes = vec![hub];
        let mut handles = vec![hub_handle];
        for _ in 0..peers {
            let peer = process(&address);
            let handle = peer.create_channel(channel).expect("peer channel");
            wait_for_state(handle.coordinator(), CoordinatorState::Client).await;
            peer_connected(&mut joined).await;
            processes.push(peer);
            handles.push(handle);
        }

        Self {
            address,
            processes,
            handles,
        }
    }

    /// Open another handle in process `index` and let it register.
    pub async fn open(&self, index: usize, channel: &str) -> ChannelHandle {
        let handle = self.processes[index]
            .create_channel(channel)
            .expect("channel");
        // Registration is a queued command; give the coordinator a turn.
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle
    }
}
