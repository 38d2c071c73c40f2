//! # Network Primitives
//!
//! Thin wrappers over tokio sockets and tokio-tungstenite:
//!
//! - [`listener`]: bind the rendezvous port, accept, upgrade to WebSocket
//! - [`connector`]: outbound TCP connect plus client handshake
//! - [`link`]: one established WebSocket split into reader/writer tasks
//!
//! Bind and connect resolve the rendezvous host the same way, so the hub
//! and its peers always agree on the socket address.

pub mod connector;
pub mod link;
pub mod listener;

use crate::error::RelayError;
use shared_types::RendezvousAddress;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;

pub use connector::connect;
pub use link::{LinkEvent, LinkId, PeerLink};
pub use listener::{accept_next, bind, upgrade};

/// A WebSocket over a plain TCP stream, either direction.
pub type WsStream = WebSocketStream<TcpStream>;

/// Resolve the rendezvous host, preferring IPv4.
///
/// `localhost` commonly resolves to both `::1` and `127.0.0.1`. Picking one
/// deterministically keeps every process racing for the same socket.
pub async fn resolve(address: &RendezvousAddress) -> Result<SocketAddr, RelayError> {
    let resolve_error = |message: String| RelayError::Resolve {
        address: address.to_string(),
        message,
    };
    let candidates: Vec<SocketAddr> = tokio::net::lookup_host((address.host(), address.port()))
        .await
        .map_err(|e| resolve_error(e.to_string()))?
        .collect();

    candidates
        .iter()
        .find(|candidate| candidate.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| resolve_error("no addresses found".to_string()))
}
