//! Coordinator election states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role-arbitration state of one coordinator.
///
/// `Closed` is the only terminal state. Every other state loops back into
/// the election cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoordinatorState {
    /// About to try binding the rendezvous port.
    ServerWannabe,
    /// Bind in progress.
    StartServer,
    /// Hub: listening and relaying.
    Server,
    /// Another process holds the port.
    AddressInUse,
    /// Bind or serve failed for another reason.
    ServerFailed,
    /// About to connect to the hub.
    ClientWannabe,
    /// Connect in progress.
    ConnectClient,
    /// Peer: connected to the hub.
    Client,
    /// Connect failed or the hub went away.
    ClientFailed,
    /// Shut down. Absorbing.
    Closed,
}

impl CoordinatorState {
    /// All states in declaration order.
    pub const ALL: [CoordinatorState; 10] = [
        Self::ServerWannabe,
        Self::StartServer,
        Self::Server,
        Self::AddressInUse,
        Self::ServerFailed,
        Self::ClientWannabe,
        Self::ConnectClient,
        Self::Client,
        Self::ClientFailed,
        Self::Closed,
    ];

    /// Kebab-case name, as used in logs and diagrams.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerWannabe => "server-wannabe",
            Self::StartServer => "start-server",
            Self::Server => "server",
            Self::AddressInUse => "address-in-use",
            Self::ServerFailed => "server-failed",
            Self::ClientWannabe => "client-wannabe",
            Self::ConnectClient => "connect-client",
            Self::Client => "client",
            Self::ClientFailed => "client-failed",
            Self::Closed => "closed",
        }
    }

    /// Whether this state has a live network connection to flush over.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Server | Self::Client)
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
