//! # Hostcast
//!
//! Broadcast channels shared by every process on one host, with no broker.
//!
//! ## How it works
//!
//! All processes using a rendezvous address race to bind its port. The
//! winner becomes the hub and accepts WebSocket connections; the others
//! connect to it as peers. A message posted on a channel handle reaches the
//! handle's local siblings first, then travels to the hub, which delivers it
//! to its own handles and forwards it to every other peer.
//!
//! ```text
//!    process A (hub)            process B (peer)        process C (peer)
//!  ┌──────────────────┐       ┌────────────────┐      ┌────────────────┐
//!  │ handles ◄─┐      │  ws   │ handles ◄─┐    │  ws  │ handles ◄─┐    │
//!  │       Coordinator◄───────┤  Coordinator   │  ┌───┤  Coordinator   │
//!  │      (listening) ◄───────────────────────────┘   │                │
//!  └──────────────────┘       └────────────────┘      └────────────────┘
//! ```
//!
//! When the hub goes away the peers race for the port again. Handles keep
//! working throughout; they only see `Close` when they, or their whole
//! coordinator, are closed.
//!
//! ## Usage
//!
//! ```no_run
//! # async fn demo() -> Result<(), hostcast::RelayError> {
//! let manager = hostcast::ChannelManager::default();
//! let mut chat = manager.create_channel("chat")?;
//! chat.post_message("hello");
//! while let Some(event) = chat.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod manager;
pub mod network;
pub mod registry;

pub use channel::{ChannelEvent, ChannelHandle, ChannelSubscription};
pub use config::{ConfigError, RelayConfig};
pub use coordinator::{election_diagram, Coordinator};
pub use error::RelayError;
pub use manager::ChannelManager;

pub use shared_bus::{EventFilter, EventSubscriber, EventTopic, InMemoryEventBus, RelayEvent};
pub use shared_types::{CoordinatorState, Envelope, InstanceId, RendezvousAddress};
