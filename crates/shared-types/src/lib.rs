//! # Shared Types Crate
//!
//! Value types that cross crate boundaries in Hostcast.
//!
//! ## Contents
//!
//! - [`RendezvousAddress`]: interned, normalized URL where participants meet.
//!   Two equal URLs always yield the same instance, so equality is a pointer
//!   comparison.
//! - [`Envelope`]: the only unit on the wire, `{from, channel, message}`.
//! - [`InstanceId`]: random per-handle id used for echo suppression.
//! - [`CoordinatorState`]: the states of the hub/peer election loop.

pub mod address;
pub mod envelope;
pub mod errors;
pub mod state;

pub use address::{RendezvousAddress, DEFAULT_RENDEZVOUS_URL};
pub use envelope::{Envelope, InstanceId};
pub use errors::*;
pub use state::CoordinatorState;
