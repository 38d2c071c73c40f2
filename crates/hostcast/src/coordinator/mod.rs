//! # Role-Arbitration Coordinator
//!
//! One coordinator per rendezvous address per process. It races every other
//! process for the address's port: the winner becomes the hub and relays,
//! the rest connect to it as peers. When the hub disappears the peers race
//! again, forever, until the coordinator is closed.
//!
//! ## Structure
//!
//! ```text
//!  Coordinator (cloneable handle)
//!      │ commands (mpsc)        shutdown (watch)
//!      ▼                              │
//!  ┌─────────────────────────────────────────────┐
//!  │ RelayTask                                   │
//!  │   StateMachine<CoordinatorState, Context>   │
//!  │   Context: registry, outbound queue,        │
//!  │            listener + peers | hub link      │
//!  └─────────────────────────────────────────────┘
//!      ▲ LinkEvent (mpsc)
//!      │
//!  reader/writer tasks per WebSocket
//! ```
//!
//! All coordinator state is owned by the task, so state changes are
//! serialized through the machine's queue without locks.

mod context;
mod task;
mod transitions;

use crate::channel::HandleShared;
use crate::config::RelayConfig;
use crate::error::RelayError;
use shared_bus::InMemoryEventBus;
use shared_types::{CoordinatorState, Envelope, InstanceId, RendezvousAddress};
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use context::RelayContext;
use task::RelayTask;

/// Requests from handles and the manager to the coordinator task.
pub(crate) enum Command {
    Register(Arc<HandleShared>),
    Unregister { name: String, id: InstanceId },
    Post(Envelope),
}

struct Shared {
    address: RendezvousAddress,
    generation: u64,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<CoordinatorState>,
    finished: watch::Receiver<bool>,
}

/// Handle to a running coordinator. Cheap to clone.
///
/// When every clone is dropped the coordinator closes itself.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    /// Start a coordinator task on `runtime`.
    ///
    /// With a `predecessor`, the task waits for that coordinator to finish
    /// tearing down before it races for the port. `on_retired` runs once
    /// the task has released every network resource.
    pub(crate) fn spawn(
        runtime: &Handle,
        address: RendezvousAddress,
        config: RelayConfig,
        events: Arc<InMemoryEventBus>,
        generation: u64,
        predecessor: Option<watch::Receiver<bool>>,
        on_retired: Box<dyn FnOnce() + Send>,
    ) -> Self {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (links_tx, links) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown) = watch::channel(false);
        let (state_tx, state) = watch::channel(CoordinatorState::ServerWannabe);
        let (finished_tx, finished) = watch::channel(false);

        let ctx = RelayContext::new(
            address.clone(),
            config,
            events,
            links_tx,
            shutdown.clone(),
            state_tx,
        );
        let task = RelayTask {
            machine: task::election_machine(),
            ctx,
            commands,
            links,
            shutdown,
            finished: finished_tx,
            predecessor,
            on_retired: Some(on_retired),
        };
        runtime.spawn(task.run());

        Self {
            shared: Arc::new(Shared {
                address,
                generation,
                commands: commands_tx,
                shutdown: shutdown_tx,
                state,
                finished,
            }),
        }
    }

    pub fn address(&self) -> &RendezvousAddress {
        &self.shared.address
    }

    /// Latest election state.
    pub fn state(&self) -> CoordinatorState {
        *self.shared.state.borrow()
    }

    /// Watch every election state change.
    pub fn state_changes(&self) -> watch::Receiver<CoordinatorState> {
        self.shared.state.clone()
    }

    /// Deliver `envelope` to local handles on its channel (except its
    /// sender) and relay it to every other process.
    ///
    /// # Errors
    ///
    /// `RelayError::Closed` if the coordinator task has stopped.
    pub fn broadcast(&self, envelope: Envelope) -> Result<(), RelayError> {
        self.send(Command::Post(envelope))
            .then_some(())
            .ok_or(RelayError::Closed)
    }

    /// Request shutdown. Idempotent.
    pub fn close(&self) {
        self.shared.shutdown.send_replace(true);
    }

    /// Whether close was requested or the task has stopped.
    pub fn is_closed(&self) -> bool {
        *self.shared.shutdown.borrow() || *self.shared.finished.borrow()
    }

    /// Resolves after the task has released its network resources.
    pub async fn closed(&self) {
        let mut finished = self.shared.finished.clone();
        // An error means the task is gone, which is just as final.
        let _ = finished.wait_for(|done| *done).await;
    }

    pub(crate) fn generation(&self) -> u64 {
        self.shared.generation
    }

    pub(crate) fn finished(&self) -> watch::Receiver<bool> {
        self.shared.finished.clone()
    }

    pub(crate) fn register(&self, handle: Arc<HandleShared>) -> bool {
        self.send(Command::Register(handle))
    }

    pub(crate) fn unregister(&self, name: String, id: InstanceId) {
        self.send(Command::Unregister { name, id });
    }

    pub(crate) fn post(&self, envelope: Envelope) {
        self.send(Command::Post(envelope));
    }

    fn send(&self, command: Command) -> bool {
        self.shared.commands.send(command).is_ok()
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("address", &self.shared.address)
            .field("generation", &self.shared.generation)
            .field("state", &self.state())
            .finish()
    }
}

/// The election state machine as a PlantUML state diagram.
pub fn election_diagram(include_final: bool) -> String {
    task::election_machine().to_plant_uml(Some("Hostcast coordinator"), include_final)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{EventFilter, EventSubscriber, EventTopic, RelayEvent};
    use std::time::Duration;
    use tokio::time::timeout;

    async fn free_address() -> RendezvousAddress {
        let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        RendezvousAddress::localhost(probe.local_addr().unwrap().port())
    }

    fn start(address: &RendezvousAddress, events: &Arc<InMemoryEventBus>) -> Coordinator {
        Coordinator::spawn(
            &Handle::current(),
            address.clone(),
            RelayConfig::default(),
            Arc::clone(events),
            1,
            None,
            Box::new(|| {}),
        )
    }

    async fn reach(coordinator: &Coordinator, state: CoordinatorState) {
        let mut changes = coordinator.state_changes();
        timeout(Duration::from_secs(5), changes.wait_for(|s| *s == state))
            .await
            .expect("timeout")
            .expect("coordinator alive");
    }

    #[tokio::test]
    async fn test_first_coordinator_becomes_hub() {
        let address = free_address().await;
        let events = Arc::new(InMemoryEventBus::new());
        let mut lifecycle = events.subscribe(EventFilter::topics(vec![EventTopic::Lifecycle]));

        let hub = start(&address, &events);
        reach(&hub, CoordinatorState::Server).await;

        let hub_started = RelayEvent::HubStarted {
            address: address.clone(),
        };
        let mut seen = Vec::new();
        while !seen.contains(&hub_started) {
            let event = timeout(Duration::from_secs(1), lifecycle.recv())
                .await
                .expect("timeout")
                .expect("bus open");
            seen.push(event);
        }
        assert!(seen.contains(&RelayEvent::StateChanged {
            address: address.clone(),
            from: CoordinatorState::ServerWannabe,
            to: CoordinatorState::StartServer,
        }));

        hub.close();
        timeout(Duration::from_secs(5), hub.closed()).await.expect("timeout");
        assert_eq!(hub.state(), CoordinatorState::Closed);
        assert!(hub.is_closed());
    }

    #[tokio::test]
    async fn test_second_coordinator_becomes_peer() {
        let address = free_address().await;
        let events = Arc::new(InMemoryEventBus::new());

        let hub = start(&address, &events);
        reach(&hub, CoordinatorState::Server).await;
        let peer = start(&address, &events);
        reach(&peer, CoordinatorState::Client).await;

        assert_eq!(hub.state(), CoordinatorState::Server);

        peer.close();
        hub.close();
        timeout(Duration::from_secs(5), peer.closed()).await.expect("timeout");
        timeout(Duration::from_secs(5), hub.closed()).await.expect("timeout");
    }

    #[tokio::test]
    async fn test_peer_takes_over_when_hub_closes() {
        let address = free_address().await;
        let events = Arc::new(InMemoryEventBus::new());

        let hub = start(&address, &events);
        reach(&hub, CoordinatorState::Server).await;
        let peer = start(&address, &events);
        reach(&peer, CoordinatorState::Client).await;

        hub.close();
        timeout(Duration::from_secs(5), hub.closed()).await.expect("timeout");
        reach(&peer, CoordinatorState::Server).await;

        peer.close();
        timeout(Duration::from_secs(5), peer.closed()).await.expect("timeout");
    }

    #[tokio::test]
    async fn test_dropping_every_handle_closes() {
        let address = free_address().await;
        let events = Arc::new(InMemoryEventBus::new());
        let hub = start(&address, &events);
        reach(&hub, CoordinatorState::Server).await;

        let mut finished = hub.finished();
        drop(hub);

        timeout(Duration::from_secs(5), finished.wait_for(|done| *done))
            .await
            .expect("timeout")
            .expect("finished flag");
    }

    #[tokio::test]
    async fn test_broadcast_after_close_fails() {
        let address = free_address().await;
        let events = Arc::new(InMemoryEventBus::new());
        let hub = start(&address, &events);
        hub.close();
        timeout(Duration::from_secs(5), hub.closed()).await.expect("timeout");

        let envelope = Envelope::new(InstanceId::new(), "chat", "late");
        assert_eq!(hub.broadcast(envelope), Err(RelayError::Closed));
    }

    #[tokio::test]
    async fn test_unexpected_fault_reaches_handles_and_hub_keeps_serving() {
        use crate::channel::ChannelEvent;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let address = free_address().await;
        let events = Arc::new(InMemoryEventBus::new());
        let mut faults = events.subscribe(EventFilter::topics(vec![EventTopic::Fault]));
        let hub = start(&address, &events);
        reach(&hub, CoordinatorState::Server).await;

        let handle = Arc::new(HandleShared::new(InstanceId::new(), "chat", address.clone(), 8));
        let mut observed = handle.subscribe();
        assert!(hub.register(Arc::clone(&handle)));

        // Valid upgrade, then a frame with a reserved opcode.
        let mut socket = tokio::net::TcpStream::connect(("127.0.0.1", address.port()))
            .await
            .unwrap();
        let request = format!(
            "GET / HTTP/1.1\r\nHost: localhost:{}\r\nUpgrade: websocket\r\n\
             Connection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n",
            address.port()
        );
        socket.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        while !response.ends_with(b"\r\n\r\n") {
            let mut byte = [0u8; 1];
            timeout(Duration::from_secs(2), socket.read_exact(&mut byte))
                .await
                .expect("timeout")
                .unwrap();
            response.push(byte[0]);
        }
        assert!(response.starts_with(b"HTTP/1.1 101"));
        socket.write_all(&[0x83, 0x80, 0, 0, 0, 0]).await.unwrap();

        let event = timeout(Duration::from_secs(2), observed.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert!(
            matches!(event, ChannelEvent::Error(RelayError::Transport(_))),
            "{event:?}"
        );
        let published = timeout(Duration::from_secs(1), faults.recv())
            .await
            .expect("timeout")
            .expect("bus open");
        assert!(matches!(published, RelayEvent::NetworkFault { .. }));

        // Still the hub, still accepting peers, handle still open.
        assert_eq!(hub.state(), CoordinatorState::Server);
        assert!(!handle.is_closed());
        let peer = start(&address, &events);
        reach(&peer, CoordinatorState::Client).await;

        peer.close();
        hub.close();
        timeout(Duration::from_secs(5), hub.closed()).await.expect("timeout");
        assert_eq!(observed.recv().await, Some(ChannelEvent::Close));
    }

    #[test]
    fn test_election_diagram() {
        let diagram = election_diagram(true);
        assert!(diagram.starts_with("@startuml"));
        assert!(diagram
            .lines()
            .any(|line| line.starts_with("[*]") && line.ends_with("server-wannabe")));
        assert!(diagram.contains(": bind the rendezvous port"));
        assert!(diagram.lines().any(|line| line.starts_with("closed") && line.ends_with("[*]")));

        let without_final = election_diagram(false);
        assert!(!without_final.contains("closed"));
    }
}
