//! # Shared Bus - Relay Diagnostics
//!
//! Structured events emitted by every coordinator, for whoever wants to
//! watch: loggers, tests, the chat tool.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Coordinator  │                    │   Observer   │
//! │  (per addr)  │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! The bus is diagnostics only. Channel messages never travel over it,
//! and an event published with no subscriber is simply dropped.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{EventFilter, EventTopic, RelayEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, EventSubscriber, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::RendezvousAddress;

    fn hub_lost(port: u16) -> RelayEvent {
        RelayEvent::HubLost {
            address: RendezvousAddress::localhost(port),
        }
    }

    #[test]
    fn test_full_buffer_drops_oldest() {
        let bus = InMemoryEventBus::with_capacity(2);
        let mut sub = bus.subscribe(EventFilter::all());

        for port in 7301..=7303 {
            bus.publish(hub_lost(port));
        }

        assert_eq!(sub.try_recv(), Ok(Some(hub_lost(7302))));
        assert_eq!(sub.try_recv(), Ok(Some(hub_lost(7303))));
        assert_eq!(sub.try_recv(), Ok(None));
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let bus = InMemoryEventBus::with_capacity(0);
        let mut sub = bus.subscribe(EventFilter::all());

        bus.publish(hub_lost(7311));
        bus.publish(hub_lost(7312));

        assert_eq!(sub.try_recv(), Ok(Some(hub_lost(7312))));
        assert_eq!(sub.try_recv(), Ok(None));
    }
}
