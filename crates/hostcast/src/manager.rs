//! # Channel Manager
//!
//! Process-wide owner of coordinators, keyed by rendezvous address and
//! reference-counted by the open handles bound to each.
//!
//! ```text
//!  create_channel_at(name, addr)
//!        │
//!        ▼
//!  slots[addr] ──missing──► spawn coordinator (generation n)
//!        │
//!        ├──closing──► spawn generation n+1, waiting on n's teardown
//!        │
//!        └──open──► open_handles += 1
//!
//!  handle.close() ──► open_handles -= 1 ──zero──► coordinator.close()
//!  coordinator retired ──► slots[addr] removed (if still generation n)
//! ```
//!
//! There is no hidden global: a manager is created and injected by the
//! application, and cloning it shares the same coordinators.

use crate::channel::ChannelHandle;
use crate::config::RelayConfig;
use crate::coordinator::Coordinator;
use crate::error::RelayError;
use parking_lot::Mutex;
use shared_bus::InMemoryEventBus;
use shared_types::RendezvousAddress;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::{debug, info};

struct Slot {
    coordinator: Coordinator,
    open_handles: usize,
    closing: bool,
}

pub(crate) struct ManagerInner {
    config: RelayConfig,
    events: Arc<InMemoryEventBus>,
    slots: Mutex<HashMap<RendezvousAddress, Slot>>,
    generations: AtomicU64,
}

impl ManagerInner {
    /// One handle on `coordinator` closed.
    pub(crate) fn release(&self, coordinator: &Coordinator) {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(coordinator.address()) else {
            return;
        };
        if slot.coordinator.generation() != coordinator.generation() {
            return;
        }
        slot.open_handles = slot.open_handles.saturating_sub(1);
        if slot.open_handles == 0 && !slot.closing {
            debug!(address = %coordinator.address(), "Last handle closed, closing coordinator");
            slot.closing = true;
            slot.coordinator.close();
        }
    }

    fn retire(&self, address: &RendezvousAddress, generation: u64) {
        let mut slots = self.slots.lock();
        if slots
            .get(address)
            .is_some_and(|slot| slot.coordinator.generation() == generation)
        {
            slots.remove(address);
            debug!(address = %address, generation, "Coordinator retired");
        }
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        for slot in self.slots.get_mut().values() {
            slot.coordinator.close();
        }
    }
}

/// Creates channel handles and owns the coordinators behind them.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<ManagerInner>,
}

impl ChannelManager {
    pub fn new(config: RelayConfig) -> Self {
        let events = Arc::new(InMemoryEventBus::with_capacity(config.channel_capacity));
        Self::with_events(config, events)
    }

    /// A manager publishing diagnostics on an existing bus.
    pub fn with_events(config: RelayConfig, events: Arc<InMemoryEventBus>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                events,
                slots: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }

    /// Open `name` on the configured default address.
    ///
    /// # Errors
    ///
    /// `RelayError::NoRuntime` outside a tokio runtime.
    pub fn create_channel(&self, name: &str) -> Result<ChannelHandle, RelayError> {
        let address = self.inner.config.default_address.clone();
        self.create_channel_at(name, &address)
    }

    /// Open `name` on `address`, starting its coordinator if needed.
    ///
    /// # Errors
    ///
    /// `RelayError::NoRuntime` outside a tokio runtime.
    pub fn create_channel_at(
        &self,
        name: &str,
        address: &RendezvousAddress,
    ) -> Result<ChannelHandle, RelayError> {
        let runtime = Handle::try_current().map_err(|_| RelayError::NoRuntime)?;

        let coordinator = {
            let mut slots = self.inner.slots.lock();
            let predecessor = match slots.get(address) {
                Some(slot) if !slot.closing => None,
                Some(slot) => Some(slot.coordinator.finished()),
                None => None,
            };
            let reusable = slots.get(address).is_some_and(|slot| !slot.closing);
            if !reusable {
                let coordinator = self.spawn(&runtime, address, predecessor);
                slots.insert(
                    address.clone(),
                    Slot {
                        coordinator,
                        open_handles: 0,
                        closing: false,
                    },
                );
            }
            let Some(slot) = slots.get_mut(address) else {
                return Err(RelayError::Closed);
            };
            slot.open_handles += 1;
            slot.coordinator.clone()
        };

        Ok(ChannelHandle::open(
            name,
            coordinator,
            Arc::downgrade(&self.inner),
            self.inner.config.channel_capacity,
        ))
    }

    fn spawn(
        &self,
        runtime: &Handle,
        address: &RendezvousAddress,
        predecessor: Option<tokio::sync::watch::Receiver<bool>>,
    ) -> Coordinator {
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
        info!(address = %address, generation, "Starting coordinator");

        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let retired_address = address.clone();
        let on_retired = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.retire(&retired_address, generation);
            }
        });

        Coordinator::spawn(
            runtime,
            address.clone(),
            self.inner.config.clone(),
            Arc::clone(&self.inner.events),
            generation,
            predecessor,
            on_retired,
        )
    }

    /// The coordinator currently serving `address`, if any.
    pub fn coordinator(&self, address: &RendezvousAddress) -> Option<Coordinator> {
        self.inner
            .slots
            .lock()
            .get(address)
            .map(|slot| slot.coordinator.clone())
    }

    /// Close the coordinator for `address`. Its handles receive `Close`.
    pub fn close_address(&self, address: &RendezvousAddress) {
        if let Some(slot) = self.inner.slots.lock().get_mut(address) {
            slot.closing = true;
            slot.coordinator.close();
        }
    }

    /// Close every coordinator. Await [`Coordinator::closed`] on the
    /// returned handles to wait for teardown.
    pub fn shutdown(&self) -> Vec<Coordinator> {
        let slots = self.inner.slots.lock();
        info!(coordinators = slots.len(), "Shutting down channel manager");
        slots
            .values()
            .map(|slot| {
                slot.coordinator.close();
                slot.coordinator.clone()
            })
            .collect()
    }

    /// Diagnostic events from every coordinator of this manager.
    pub fn events(&self) -> Arc<InMemoryEventBus> {
        Arc::clone(&self.inner.events)
    }

    /// Addresses with a coordinator that has not yet retired.
    pub fn active_addresses(&self) -> Vec<RendezvousAddress> {
        self.inner.slots.lock().keys().cloned().collect()
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("default_address", &self.inner.config.default_address)
            .field("active", &self.inner.slots.lock().len())
            .finish()
    }
}
