//! # Relay Events
//!
//! Everything a coordinator reports about itself.

use serde::{Deserialize, Serialize};
use shared_types::{CoordinatorState, RendezvousAddress};

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelayEvent {
    // =========================================================================
    // LIFECYCLE
    // =========================================================================
    /// The election state machine moved.
    StateChanged {
        address: RendezvousAddress,
        from: CoordinatorState,
        to: CoordinatorState,
    },

    /// This process won the port and now relays for everyone else.
    HubStarted { address: RendezvousAddress },

    /// The coordinator finished tearing down its network resources.
    CoordinatorClosed { address: RendezvousAddress },

    // =========================================================================
    // CONNECTIONS
    // =========================================================================
    /// As hub: a peer completed the WebSocket handshake.
    PeerConnected {
        address: RendezvousAddress,
        remote: String,
    },

    /// As hub: a peer connection ended.
    PeerDisconnected {
        address: RendezvousAddress,
        remote: String,
    },

    /// As hub: an inbound connection was not a WebSocket upgrade.
    HandshakeRejected {
        address: RendezvousAddress,
        remote: String,
        reason: String,
    },

    /// As peer: connected to the hub.
    HubConnected { address: RendezvousAddress },

    /// As peer: the hub connection ended.
    HubLost { address: RendezvousAddress },

    // =========================================================================
    // PROBLEMS
    // =========================================================================
    /// An inbound frame was dropped because it is not an envelope.
    DecodeFailed {
        address: RendezvousAddress,
        reason: String,
    },

    /// A network error outside the expected collision/refusal/close set.
    NetworkFault {
        address: RendezvousAddress,
        error: String,
    },
}

impl RelayEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::StateChanged { .. } | Self::HubStarted { .. } | Self::CoordinatorClosed { .. } => {
                EventTopic::Lifecycle
            }
            Self::PeerConnected { .. }
            | Self::PeerDisconnected { .. }
            | Self::HandshakeRejected { .. }
            | Self::HubConnected { .. }
            | Self::HubLost { .. } => EventTopic::Connection,
            Self::DecodeFailed { .. } => EventTopic::Decode,
            Self::NetworkFault { .. } => EventTopic::Fault,
        }
    }

    /// The rendezvous address of the coordinator that emitted the event.
    #[must_use]
    pub fn address(&self) -> &RendezvousAddress {
        match self {
            Self::StateChanged { address, .. }
            | Self::HubStarted { address }
            | Self::CoordinatorClosed { address }
            | Self::PeerConnected { address, .. }
            | Self::PeerDisconnected { address, .. }
            | Self::HandshakeRejected { address, .. }
            | Self::HubConnected { address }
            | Self::HubLost { address }
            | Self::DecodeFailed { address, .. }
            | Self::NetworkFault { address, .. } => address,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// State changes, hub start, coordinator close.
    Lifecycle,
    /// Peer and hub connections.
    Connection,
    /// Dropped frames.
    Decode,
    /// Unexpected network errors.
    Fault,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Addresses to include. Empty means all addresses.
    pub addresses: Vec<RendezvousAddress>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            addresses: Vec::new(),
        }
    }

    /// Create a filter for events from one rendezvous address.
    #[must_use]
    pub fn address(address: RendezvousAddress) -> Self {
        Self {
            topics: Vec::new(),
            addresses: vec![address],
        }
    }

    /// Narrow an existing filter to one more address.
    #[must_use]
    pub fn with_address(mut self, address: RendezvousAddress) -> Self {
        self.addresses.push(address);
        self
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &RelayEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let address_match = self.addresses.is_empty() || self.addresses.contains(event.address());

        topic_match && address_match
    }
}
