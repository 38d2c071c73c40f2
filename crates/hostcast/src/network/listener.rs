//! Hub side: bind, accept, upgrade.

use super::{resolve, WsStream};
use crate::error::RelayError;
use shared_types::RendezvousAddress;
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// Bind the rendezvous port.
///
/// # Errors
///
/// - `RelayError::AddressInUse` - another process is already the hub
/// - `RelayError::Bind` - any other bind failure
pub async fn bind(address: &RendezvousAddress) -> Result<TcpListener, RelayError> {
    let socket_addr = resolve(address).await?;
    let listener = TcpListener::bind(socket_addr)
        .await
        .map_err(|e| RelayError::bind(address.as_str(), &e))?;
    debug!(address = %address, local = %socket_addr, "Listener bound");
    Ok(listener)
}

/// Accept the next connection, or wait forever when there is no listener.
///
/// Lets a `select!` loop poll accept unconditionally.
pub async fn accept_next(listener: Option<&TcpListener>) -> io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

/// Complete the server side of the WebSocket handshake.
pub async fn upgrade(stream: TcpStream) -> Result<WsStream, RelayError> {
    let _ = stream.set_nodelay(true);
    tokio_tungstenite::accept_async(stream)
        .await
        .map_err(RelayError::handshake)
}
