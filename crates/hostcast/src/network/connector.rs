//! Peer side: connect to the hub.

use super::{resolve, WsStream};
use crate::error::RelayError;
use shared_types::RendezvousAddress;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Open a WebSocket to the hub at `address`.
///
/// TCP connect and handshake together must finish within `timeout`.
pub async fn connect(address: &RendezvousAddress, timeout: Duration) -> Result<WsStream, RelayError> {
    let socket_addr = resolve(address).await?;

    let attempt = async {
        let stream = TcpStream::connect(socket_addr)
            .await
            .map_err(|e| RelayError::connect(address.as_str(), &e))?;
        let _ = stream.set_nodelay(true);
        let (ws, _response) = tokio_tungstenite::client_async(address.websocket_url(), stream)
            .await
            .map_err(RelayError::handshake)?;
        Ok::<_, RelayError>(ws)
    };

    let ws = tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| RelayError::ConnectTimeout {
            address: address.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        })??;
    debug!(address = %address, remote = %socket_addr, "Connected to hub");
    Ok(ws)
}
