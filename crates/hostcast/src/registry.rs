//! # Channel Registry
//!
//! Per-coordinator map of channel name to the local handles subscribed to
//! it. Owned by the coordinator task, so it needs no locking.
//!
//! A name is present only while at least one handle is registered under
//! it; the last unregister removes the entry.

use crate::channel::{ChannelEvent, HandleShared};
use crate::error::RelayError;
use shared_types::{Envelope, InstanceId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, HashMap<InstanceId, Arc<HandleShared>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handle: Arc<HandleShared>) {
        trace!(channel = %handle.name(), id = %handle.id(), "Handle registered");
        self.channels
            .entry(handle.name().to_string())
            .or_default()
            .insert(handle.id().clone(), handle);
    }

    /// Remove one handle. Returns whether it was registered.
    pub fn unregister(&mut self, name: &str, id: &InstanceId) -> bool {
        let Some(set) = self.channels.get_mut(name) else {
            return false;
        };
        let removed = set.remove(id).is_some();
        if set.is_empty() {
            self.channels.remove(name);
        }
        removed
    }

    /// Hand `envelope` to every open handle on its channel except its sender.
    ///
    /// Returns the number of handles it reached.
    pub fn deliver(&self, envelope: &Envelope) -> usize {
        let Some(set) = self.channels.get(&envelope.channel) else {
            return 0;
        };
        set.values()
            .filter(|handle| !envelope.is_from(handle.id()))
            .filter(|handle| handle.emit(ChannelEvent::Message(envelope.message.clone())))
            .count()
    }

    /// Push an error to every registered handle.
    pub fn broadcast_error(&self, error: &RelayError) {
        for handle in self.channels.values().flat_map(HashMap::values) {
            handle.emit(ChannelEvent::Error(error.clone()));
        }
    }

    /// Close every handle and forget them all.
    pub fn close_all(&mut self) {
        for (_, set) in self.channels.drain() {
            for handle in set.into_values() {
                handle.mark_closed();
            }
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn handle_count(&self) -> usize {
        self.channels.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
