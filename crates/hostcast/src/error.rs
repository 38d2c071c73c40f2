//! # Relay Errors
//!
//! One error type for the whole relay. It is `Clone` so that a single fault
//! can be pushed to every affected channel handle.
//!
//! ## Taxonomy
//!
//! | Kind | Examples | Handling |
//! |------|----------|----------|
//! | Expected | port collision, refused, reset, closed, timeout | election loop retries, logged at debug |
//! | Unexpected | other bind/accept/handshake/transport failures | `ChannelEvent::Error` to handles, loop still retries |
//! | Programming | disallowed transition | fatal to the coordinator |

use shared_types::AddressError;
use std::io;
use thiserror::Error;
use tokio_tungstenite::tungstenite::{self, error::ProtocolError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    /// Could not resolve the rendezvous host.
    #[error("Failed to resolve {address}: {message}")]
    Resolve { address: String, message: String },

    /// Another process is the hub.
    #[error("Address {address} is already in use")]
    AddressInUse { address: String },

    #[error("Failed to bind {address}: {message}")]
    Bind {
        address: String,
        kind: io::ErrorKind,
        message: String,
    },

    #[error("Failed to accept connection: {message}")]
    Accept { kind: io::ErrorKind, message: String },

    #[error("Failed to connect to {address}: {message}")]
    Connect {
        address: String,
        kind: io::ErrorKind,
        message: String,
    },

    #[error("Timed out connecting to {address} after {timeout_ms}ms")]
    ConnectTimeout { address: String, timeout_ms: u64 },

    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    /// The other side went away.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Any other WebSocket failure on an established connection.
    #[error("WebSocket transport error: {0}")]
    Transport(String),

    /// `create_channel` was called outside a tokio runtime.
    #[error("No tokio runtime available")]
    NoRuntime,

    #[error("Coordinator is closed")]
    Closed,

    /// The election state machine rejected a transition.
    #[error("State machine error: {0}")]
    Transition(String),
}

impl RelayError {
    /// Whether this is part of normal election churn rather than a fault.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        match self {
            Self::AddressInUse { .. }
            | Self::ConnectTimeout { .. }
            | Self::ConnectionLost(_)
            | Self::Closed => true,
            Self::Connect { kind, .. } | Self::Accept { kind, .. } => is_expected_kind(*kind),
            _ => false,
        }
    }

    pub(crate) fn bind(address: &str, err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::AddrInUse => Self::AddressInUse {
                address: address.to_string(),
            },
            kind => Self::Bind {
                address: address.to_string(),
                kind,
                message: err.to_string(),
            },
        }
    }

    pub(crate) fn accept(err: &io::Error) -> Self {
        Self::Accept {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub(crate) fn connect(address: &str, err: &io::Error) -> Self {
        Self::Connect {
            address: address.to_string(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Handshake failure; a peer vanishing mid-handshake counts as lost.
    pub(crate) fn handshake(err: tungstenite::Error) -> Self {
        if is_closed_error(&err) {
            Self::ConnectionLost(err.to_string())
        } else {
            Self::Handshake(err.to_string())
        }
    }

    pub(crate) fn transport(err: tungstenite::Error) -> Self {
        if is_closed_error(&err) {
            Self::ConnectionLost(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

fn is_expected_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::TimedOut
    )
}

/// WebSocket errors that just mean the other side closed or vanished.
pub(crate) fn is_closed_error(err: &tungstenite::Error) -> bool {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => true,
        tungstenite::Error::Io(e) => is_expected_kind(e.kind()),
        tungstenite::Error::Protocol(
            ProtocolError::ResetWithoutClosingHandshake | ProtocolError::HandshakeIncomplete,
        ) => true,
        _ => false,
    }
}
