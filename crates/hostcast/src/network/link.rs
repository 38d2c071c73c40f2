//! # Peer Link
//!
//! An established WebSocket, split into a writer task fed by an unbounded
//! queue and a reader task that decodes frames and reports them back to the
//! coordinator as [`LinkEvent`]s.
//!
//! ```text
//!  coordinator ──send(text)──► writer task ──► socket
//!  coordinator ◄──LinkEvent─── reader task ◄── socket
//! ```

use super::WsStream;
use crate::error::RelayError;
use futures::{SinkExt, StreamExt};
use shared_types::{DecodeError, Envelope};
use std::fmt;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

/// Coordinator-local id of a link.
pub type LinkId = u64;

/// Everything the network side reports to a coordinator.
pub enum LinkEvent {
    /// An accepted connection finished its handshake.
    Upgraded { stream: WsStream, remote: SocketAddr },

    /// An accepted connection failed its handshake.
    UpgradeFailed { remote: SocketAddr, error: RelayError },

    /// Dial `id` to the hub finished its handshake.
    Connected { id: LinkId, stream: WsStream },

    /// Dial `id` to the hub failed or timed out.
    ConnectFailed { id: LinkId, error: RelayError },

    /// A well-formed envelope arrived. `raw` is the frame as received.
    Inbound {
        id: LinkId,
        envelope: Envelope,
        raw: String,
    },

    /// A frame arrived that is not an envelope.
    Malformed { id: LinkId, error: DecodeError },

    /// The link ended. `error` is `None` for a clean close.
    Closed {
        id: LinkId,
        error: Option<RelayError>,
    },
}

impl fmt::Debug for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upgraded { remote, .. } => f
                .debug_struct("Upgraded")
                .field("remote", remote)
                .finish_non_exhaustive(),
            Self::UpgradeFailed { remote, error } => f
                .debug_struct("UpgradeFailed")
                .field("remote", remote)
                .field("error", error)
                .finish(),
            Self::Connected { id, .. } => f
                .debug_struct("Connected")
                .field("id", id)
                .finish_non_exhaustive(),
            Self::ConnectFailed { id, error } => f
                .debug_struct("ConnectFailed")
                .field("id", id)
                .field("error", error)
                .finish(),
            Self::Inbound { id, envelope, .. } => f
                .debug_struct("Inbound")
                .field("id", id)
                .field("envelope", envelope)
                .finish_non_exhaustive(),
            Self::Malformed { id, error } => f
                .debug_struct("Malformed")
                .field("id", id)
                .field("error", error)
                .finish(),
            Self::Closed { id, error } => f
                .debug_struct("Closed")
                .field("id", id)
                .field("error", error)
                .finish(),
        }
    }
}

/// Handle to the tasks serving one WebSocket.
pub struct PeerLink {
    id: LinkId,
    remote: String,
    outbound: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl PeerLink {
    /// Start serving `stream`. Reader events go to `events`.
    pub fn spawn(
        id: LinkId,
        remote: impl Into<String>,
        stream: WsStream,
        events: mpsc::UnboundedSender<LinkEvent>,
        max_message_bytes: usize,
    ) -> Self {
        let (mut sink, mut source) = stream.split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<String>();

        let writer = tokio::spawn(async move {
            while let Some(text) = queue.recv().await {
                if let Err(e) = sink.send(Message::text(text)).await {
                    trace!(link = id, error = %e, "Write failed, stopping writer");
                    return;
                }
            }
            // Queue closed: the coordinator let go of this link.
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            let error = loop {
                let Some(next) = source.next().await else {
                    break None;
                };
                let event = match next {
                    Ok(Message::Text(text)) => decoded(id, text.as_str(), max_message_bytes),
                    Ok(Message::Binary(bytes)) => {
                        match Envelope::decode_bytes(&bytes, max_message_bytes) {
                            Ok(envelope) => LinkEvent::Inbound {
                                id,
                                envelope,
                                raw: String::from_utf8_lossy(&bytes).into_owned(),
                            },
                            Err(error) => LinkEvent::Malformed { id, error },
                        }
                    }
                    Ok(Message::Close(_)) => break None,
                    // Pings are answered by tungstenite itself.
                    Ok(_) => continue,
                    Err(e) => break Some(RelayError::transport(e)),
                };
                if events.send(event).is_err() {
                    return;
                }
            };
            let _ = events.send(LinkEvent::Closed { id, error });
        });

        Self {
            id,
            remote: remote.into(),
            outbound,
            reader,
            writer,
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Queue one text frame.
    ///
    /// # Errors
    ///
    /// `RelayError::ConnectionLost` if the writer has already stopped.
    pub fn send(&self, text: String) -> Result<(), RelayError> {
        self.outbound
            .send(text)
            .map_err(|_| RelayError::ConnectionLost(format!("link to {} is closed", self.remote)))
    }

    /// Whether the writer has stopped.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed() || self.writer.is_finished()
    }

    /// Close the link. Queued frames are still flushed, then a close frame
    /// is sent. No `Closed` event is reported for a link closed this way.
    pub fn close(self) {
        debug!(link = self.id, remote = %self.remote, "Closing link");
        self.reader.abort();
        drop(self.outbound);
        // Writer finishes on its own once the queue drains.
        drop(self.writer);
    }
}

fn decoded(id: LinkId, text: &str, max_message_bytes: usize) -> LinkEvent {
    match Envelope::decode(text, max_message_bytes) {
        Ok(envelope) => LinkEvent::Inbound {
            id,
            envelope,
            raw: text.to_string(),
        },
        Err(error) => LinkEvent::Malformed { id, error },
    }
}
