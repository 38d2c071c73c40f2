//! Everything a coordinator owns, handed explicitly to every transition
//! action and hook.

use crate::channel::HandleShared;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::network::{LinkEvent, LinkId, PeerLink};
use crate::registry::ChannelRegistry;
use shared_bus::{EventPublisher, InMemoryEventBus, RelayEvent};
use shared_fsm::Transition;
use shared_types::{CoordinatorState, Envelope, InstanceId, RendezvousAddress};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

pub struct RelayContext {
    pub(super) address: RendezvousAddress,
    pub(super) config: RelayConfig,
    pub(super) events: Arc<InMemoryEventBus>,
    pub(super) registry: ChannelRegistry,
    /// Envelopes waiting for a connected role.
    pub(super) outbound: VecDeque<Envelope>,

    // Hub role
    pub(super) listener: Option<TcpListener>,
    pub(super) peers: HashMap<LinkId, PeerLink>,

    // Peer role
    pub(super) hub: Option<PeerLink>,
    /// Dial to the hub still in flight, by the link id it will get.
    pub(super) dial: Option<(LinkId, JoinHandle<()>)>,
    pub(super) retry_at: Option<Instant>,

    pub(super) links: mpsc::UnboundedSender<LinkEvent>,
    next_link_id: LinkId,
    pub(super) shutdown: watch::Receiver<bool>,
    closing: bool,
    pub(super) state: CoordinatorState,
    state_tx: watch::Sender<CoordinatorState>,
}

impl RelayContext {
    pub(super) fn new(
        address: RendezvousAddress,
        config: RelayConfig,
        events: Arc<InMemoryEventBus>,
        links: mpsc::UnboundedSender<LinkEvent>,
        shutdown: watch::Receiver<bool>,
        state_tx: watch::Sender<CoordinatorState>,
    ) -> Self {
        Self {
            address,
            config,
            events,
            registry: ChannelRegistry::new(),
            outbound: VecDeque::new(),
            listener: None,
            peers: HashMap::new(),
            hub: None,
            dial: None,
            retry_at: None,
            links,
            next_link_id: 0,
            shutdown,
            closing: false,
            state: CoordinatorState::ServerWannabe,
            state_tx,
        }
    }

    /// Whether close has been requested. Checked by the before-transition
    /// hook, so every later request ends in `Closed`.
    pub(super) fn is_closing(&self) -> bool {
        self.closing || *self.shutdown.borrow()
    }

    pub(super) fn request_close(&mut self) {
        self.closing = true;
    }

    pub(super) fn next_link_id(&mut self) -> LinkId {
        self.next_link_id += 1;
        self.next_link_id
    }

    pub(super) fn publish(&self, event: RelayEvent) {
        self.events.publish(event);
    }

    /// Observer hook: runs after every state change.
    pub(super) fn state_changed(&mut self, transition: &Transition<CoordinatorState>) {
        debug!(
            address = %self.address,
            from = %transition.from,
            to = %transition.to,
            "Coordinator state changed"
        );
        self.state = transition.to;
        self.state_tx.send_replace(transition.to);
        self.publish(RelayEvent::StateChanged {
            address: self.address.clone(),
            from: transition.from,
            to: transition.to,
        });
    }

    /// Record a network error. Expected churn is only logged; anything
    /// else reaches every local handle and the diagnostic bus.
    pub(super) fn fault(&self, error: RelayError) {
        if error.is_expected() {
            debug!(address = %self.address, error = %error, "Expected network condition");
            return;
        }
        warn!(address = %self.address, error = %error, "Network fault");
        self.publish(RelayEvent::NetworkFault {
            address: self.address.clone(),
            error: error.to_string(),
        });
        self.registry.broadcast_error(&error);
    }

    // =========================================================================
    // LOCAL COMMANDS
    // =========================================================================

    pub(super) fn register(&mut self, handle: Arc<HandleShared>) {
        if self.state == CoordinatorState::Closed {
            handle.mark_closed();
            return;
        }
        self.registry.register(handle);
    }

    pub(super) fn unregister(&mut self, name: &str, id: &InstanceId) {
        self.registry.unregister(name, id);
    }

    /// Local delivery first, then relay.
    pub(super) fn post(&mut self, envelope: Envelope) {
        self.registry.deliver(&envelope);
        self.outbound.push_back(envelope);
        self.flush();
    }

    /// Send queued envelopes if the current role has somewhere to send them.
    pub(super) fn flush(&mut self) {
        match self.state {
            CoordinatorState::Server => {
                while let Some(envelope) = self.outbound.pop_front() {
                    let frame = envelope.encode();
                    for peer in self.peers.values() {
                        // A dead peer reports its own close.
                        let _ = peer.send(frame.clone());
                    }
                }
            }
            CoordinatorState::Client => {
                let Some(hub) = &self.hub else {
                    return;
                };
                while let Some(envelope) = self.outbound.pop_front() {
                    if hub.send(envelope.encode()).is_err() {
                        self.outbound.push_front(envelope);
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// An envelope from link `id`. As hub, also forwarded to every other
    /// peer unchanged.
    pub(super) fn inbound(&mut self, id: LinkId, envelope: &Envelope, raw: String) {
        if self.peers.contains_key(&id) {
            self.registry.deliver(envelope);
            for (_, peer) in self.peers.iter().filter(|(peer_id, _)| **peer_id != id) {
                let _ = peer.send(raw.clone());
            }
        } else if self.hub.as_ref().is_some_and(|hub| hub.id() == id) {
            self.registry.deliver(envelope);
        } else {
            debug!(link = id, "Dropping frame from a retired link");
        }
    }

    // =========================================================================
    // TEARDOWN
    // =========================================================================

    pub(super) fn teardown_server(&mut self) {
        if self.listener.take().is_some() {
            debug!(address = %self.address, "Listener released");
        }
        for (_, peer) in self.peers.drain() {
            peer.close();
        }
    }

    /// Claim the outcome of dial `id`. `false` if that dial was abandoned.
    pub(super) fn take_dial(&mut self, id: LinkId) -> bool {
        if self.dial.as_ref().is_some_and(|(dial, _)| *dial == id) {
            self.dial = None;
            true
        } else {
            false
        }
    }

    pub(super) fn teardown_client(&mut self) {
        if let Some((_, dial)) = self.dial.take() {
            dial.abort();
        }
        if let Some(hub) = self.hub.take() {
            hub.close();
        }
    }
}
