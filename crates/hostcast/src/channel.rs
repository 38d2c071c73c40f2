//! # Channel Handles
//!
//! The subscriber-facing side of a broadcast channel.
//!
//! A [`ChannelHandle`] never touches the network. Posting hands an envelope
//! to the coordinator task, which delivers it to sibling handles and relays
//! it to other processes. Inbound messages arrive as [`ChannelEvent`]s, so
//! delivery is always asynchronous relative to the post that caused it.
//!
//! ```text
//!  handle.post_message ──► Coordinator ──► registry.deliver ──► sibling handles
//!                                     └──► network relay
//! ```

use crate::coordinator::Coordinator;
use crate::error::RelayError;
use crate::manager::ManagerInner;
use shared_types::{Envelope, InstanceId, RendezvousAddress};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// What a handle's subscribers observe.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A message posted by another handle on the same channel.
    Message(String),
    /// An unexpected network fault in the coordinator. The handle stays open.
    Error(RelayError),
    /// The handle was closed. Always the last event.
    Close,
}

/// State shared between a handle and the coordinator's registry.
pub struct HandleShared {
    id: InstanceId,
    name: String,
    address: RendezvousAddress,
    open: AtomicBool,
    events: broadcast::Sender<ChannelEvent>,
}

impl HandleShared {
    pub(crate) fn new(
        id: InstanceId,
        name: impl Into<String>,
        address: RendezvousAddress,
        capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            id,
            name: name.into(),
            address,
            open: AtomicBool::new(true),
            events,
        }
    }

    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &RendezvousAddress {
        &self.address
    }

    pub fn is_closed(&self) -> bool {
        !self.open.load(Ordering::Acquire)
    }

    /// Send an event to every subscription. Returns `false` once closed.
    pub(crate) fn emit(&self, event: ChannelEvent) -> bool {
        if self.is_closed() {
            return false;
        }
        // No live subscription is fine; the event is simply unobserved.
        let _ = self.events.send(event);
        true
    }

    /// Flip the open flag and emit `Close`. Only the first call does anything.
    pub(crate) fn mark_closed(&self) -> bool {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.events.send(ChannelEvent::Close);
            true
        } else {
            false
        }
    }

    pub(crate) fn subscribe(&self) -> ChannelSubscription {
        ChannelSubscription {
            receiver: self.events.subscribe(),
            done: self.is_closed(),
        }
    }
}

/// An independent, ordered view of one handle's events.
///
/// A subscription that falls more than `channel_capacity` events behind
/// loses the oldest ones.
pub struct ChannelSubscription {
    receiver: broadcast::Receiver<ChannelEvent>,
    done: bool,
}

impl ChannelSubscription {
    /// Next event, or `None` after `Close` has been returned.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        while !self.done {
            match self.receiver.recv().await {
                Ok(event) => return Some(self.observe(event)),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(lagged = count, "Channel subscriber lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => self.done = true,
            }
        }
        None
    }

    /// Next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        while !self.done {
            match self.receiver.try_recv() {
                Ok(event) => return Some(self.observe(event)),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(lagged = count, "Channel subscriber lagged, messages dropped");
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Closed) => self.done = true,
            }
        }
        None
    }

    fn observe(&mut self, event: ChannelEvent) -> ChannelEvent {
        if event == ChannelEvent::Close {
            self.done = true;
        }
        event
    }
}

/// One local participant on a named channel at a rendezvous address.
///
/// Created by [`ChannelManager::create_channel`](crate::ChannelManager::create_channel).
/// Dropping the handle closes it.
pub struct ChannelHandle {
    shared: Arc<HandleShared>,
    coordinator: Coordinator,
    manager: Weak<ManagerInner>,
    events: ChannelSubscription,
    released: AtomicBool,
}

impl ChannelHandle {
    /// Build a handle and register it with `coordinator`.
    ///
    /// The primary subscription exists before registration, so no message
    /// delivered to the handle can be missed.
    pub(crate) fn open(
        name: &str,
        coordinator: Coordinator,
        manager: Weak<ManagerInner>,
        capacity: usize,
    ) -> Self {
        let shared = Arc::new(HandleShared::new(
            InstanceId::new(),
            name,
            coordinator.address().clone(),
            capacity,
        ));
        let events = shared.subscribe();
        if !coordinator.register(Arc::clone(&shared)) {
            // The coordinator task is already gone; nothing will ever arrive.
            shared.mark_closed();
        }
        debug!(channel = name, id = %shared.id(), address = %shared.address(), "Channel opened");
        Self {
            shared,
            coordinator,
            manager,
            events,
            released: AtomicBool::new(false),
        }
    }

    /// Post `data` to every other handle on this channel, in this process
    /// and others. Silently dropped once the handle is closed.
    pub fn post_message(&self, data: impl Into<String>) {
        if self.is_closed() {
            return;
        }
        let envelope = Envelope::new(self.shared.id.clone(), self.shared.name.as_str(), data);
        self.coordinator.post(envelope);
    }

    /// Close the handle. Idempotent; `Close` is emitted exactly once.
    pub fn close(&self) {
        if self.shared.mark_closed() {
            debug!(channel = %self.shared.name, id = %self.shared.id, "Channel closed");
        }
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.coordinator
            .unregister(self.shared.name.clone(), self.shared.id.clone());
        if let Some(manager) = self.manager.upgrade() {
            manager.release(&self.coordinator);
        }
    }

    /// Next event on the primary subscription. `None` after `Close`.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Next buffered event on the primary subscription, without waiting.
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.events.try_recv()
    }

    /// An additional subscription that sees every event from now on.
    pub fn subscribe(&self) -> ChannelSubscription {
        self.shared.subscribe()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn id(&self) -> &InstanceId {
        &self.shared.id
    }

    pub fn address(&self) -> &RendezvousAddress {
        &self.shared.address
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// The coordinator relaying for this handle's address.
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("name", &self.shared.name)
            .field("id", &self.shared.id)
            .field("address", &self.shared.address)
            .field("closed", &self.is_closed())
            .finish()
    }
}
