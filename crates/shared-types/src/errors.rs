//! # Error Types
//!
//! Errors produced while parsing addresses and decoding wire frames.

use thiserror::Error;

/// Errors that can occur while building a [`crate::RendezvousAddress`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The string is not a URL at all.
    #[error("Invalid rendezvous URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The URL parsed but names no host to bind or connect to.
    #[error("Rendezvous URL {0:?} has no host")]
    MissingHost(String),

    /// No explicit port and the scheme has no well-known default.
    #[error("Rendezvous URL {0:?} has no port and scheme has no default port")]
    MissingPort(String),
}

/// Errors from decoding a frame into an [`crate::Envelope`].
///
/// A decode error never closes the connection; the frame is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Not JSON, or JSON missing a string `from`/`channel`/`message` field.
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    /// Frame exceeds the configured size limit.
    #[error("Frame too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    /// Binary frame whose payload is not UTF-8.
    #[error("Binary frame is not valid UTF-8")]
    NotUtf8,
}
