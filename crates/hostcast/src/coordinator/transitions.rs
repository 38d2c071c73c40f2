//! # Election Transition Table
//!
//! ```text
//!  server-wannabe ─► start-server ─┬─► server ──────────┐
//!        ▲                         ├─► address-in-use ─┐ │
//!        │                         └─► server-failed ◄─┼─┘
//!        │                                   │         │
//!        │                                   ▼         ▼
//!  client-failed ◄─┬── connect-client ◄── client-wannabe
//!        ▲         │
//!        │         └─► client
//!        └─────────────────┘
//! ```
//!
//! Every state except `closed` may also move to `closed`, which only loops
//! on itself. A hub that fails always passes through `client-wannabe`
//! before it races for the port again.

use super::context::RelayContext;
use crate::error::RelayError;
use crate::network::{self, LinkEvent};
use async_trait::async_trait;
use shared_bus::RelayEvent;
use shared_fsm::{Goto, Transition, TransitionAction, TransitionDef};
use shared_types::CoordinatorState::{self, *};
use tokio::time::Instant;
use tracing::{debug, info};

type Row = TransitionDef<CoordinatorState, RelayContext>;

/// The coordinator's transition table.
pub fn table() -> Vec<Row> {
    let mut rows = vec![
        Row::new(ServerWannabe, StartServer)
            .with_action(BindListener)
            .with_description("bind the rendezvous port"),
        Row::new(StartServer, Server).with_action(StartServing),
        Row::new(StartServer, AddressInUse).with_action(Goto::new(ClientWannabe)),
        Row::new(StartServer, ServerFailed).with_action(DisposeServer),
        Row::new(Server, ServerFailed).with_action(DisposeServer),
        Row::new(AddressInUse, ClientWannabe).with_action(Goto::new(ConnectClient)),
        Row::new(ServerFailed, ClientWannabe).with_action(Goto::new(ConnectClient)),
        Row::new(ClientWannabe, ConnectClient)
            .with_action(ConnectHub)
            .with_description("connect to the hub"),
        Row::new(ConnectClient, Client).with_action(StartClient),
        Row::new(ConnectClient, ClientFailed).with_action(DisposeClient),
        Row::new(Client, ClientFailed).with_action(DisposeClient),
        Row::new(ClientFailed, ServerWannabe).with_action(Goto::new(StartServer)),
    ];

    for from in CoordinatorState::ALL {
        if from != Closed {
            rows.push(Row::new(from, Closed).with_action(Shutdown));
        }
    }
    rows.push(Row::new(Closed, Closed));
    rows
}

// =============================================================================
// HUB ROLE
// =============================================================================

struct BindListener;

#[async_trait]
impl TransitionAction<CoordinatorState, RelayContext> for BindListener {
    async fn execute(
        &self,
        ctx: &mut RelayContext,
        _transition: &Transition<CoordinatorState>,
    ) -> Option<CoordinatorState> {
        match network::bind(&ctx.address).await {
            Ok(listener) => {
                ctx.listener = Some(listener);
                Some(Server)
            }
            Err(RelayError::AddressInUse { .. }) => {
                debug!(address = %ctx.address, "Port taken, another process is the hub");
                Some(AddressInUse)
            }
            Err(e) => {
                ctx.fault(e);
                Some(ServerFailed)
            }
        }
    }

    fn name(&self) -> &str {
        "bind_listener"
    }
}

struct StartServing;

#[async_trait]
impl TransitionAction<CoordinatorState, RelayContext> for StartServing {
    async fn execute(
        &self,
        ctx: &mut RelayContext,
        _transition: &Transition<CoordinatorState>,
    ) -> Option<CoordinatorState> {
        info!(address = %ctx.address, "Acting as hub");
        ctx.publish(RelayEvent::HubStarted {
            address: ctx.address.clone(),
        });
        ctx.flush();
        None
    }

    fn name(&self) -> &str {
        "start_serving"
    }
}

struct DisposeServer;

#[async_trait]
impl TransitionAction<CoordinatorState, RelayContext> for DisposeServer {
    async fn execute(
        &self,
        ctx: &mut RelayContext,
        _transition: &Transition<CoordinatorState>,
    ) -> Option<CoordinatorState> {
        ctx.teardown_server();
        Some(ClientWannabe)
    }

    fn name(&self) -> &str {
        "dispose_server"
    }
}

// =============================================================================
// PEER ROLE
// =============================================================================

/// Starts the dial off the task. The outcome comes back as a link event,
/// which moves the machine on to `client` or `client-failed`.
struct ConnectHub;

#[async_trait]
impl TransitionAction<CoordinatorState, RelayContext> for ConnectHub {
    async fn execute(
        &self,
        ctx: &mut RelayContext,
        _transition: &Transition<CoordinatorState>,
    ) -> Option<CoordinatorState> {
        let id = ctx.next_link_id();
        let address = ctx.address.clone();
        let timeout = ctx.config.connect_timeout();
        let links = ctx.links.clone();
        let dial = tokio::spawn(async move {
            let event = match network::connect(&address, timeout).await {
                Ok(stream) => LinkEvent::Connected { id, stream },
                Err(error) => LinkEvent::ConnectFailed { id, error },
            };
            let _ = links.send(event);
        });
        debug!(address = %ctx.address, link = id, "Dialing hub");
        ctx.dial = Some((id, dial));
        None
    }

    fn name(&self) -> &str {
        "connect_hub"
    }
}

struct StartClient;

#[async_trait]
impl TransitionAction<CoordinatorState, RelayContext> for StartClient {
    async fn execute(
        &self,
        ctx: &mut RelayContext,
        _transition: &Transition<CoordinatorState>,
    ) -> Option<CoordinatorState> {
        info!(address = %ctx.address, "Connected to hub");
        ctx.publish(RelayEvent::HubConnected {
            address: ctx.address.clone(),
        });
        ctx.flush();
        None
    }

    fn name(&self) -> &str {
        "start_client"
    }
}

/// Drops the hub link and schedules the next election round. The delay is
/// served by the task loop so commands keep flowing meanwhile.
struct DisposeClient;

#[async_trait]
impl TransitionAction<CoordinatorState, RelayContext> for DisposeClient {
    async fn execute(
        &self,
        ctx: &mut RelayContext,
        _transition: &Transition<CoordinatorState>,
    ) -> Option<CoordinatorState> {
        ctx.teardown_client();
        ctx.retry_at = Some(Instant::now() + ctx.config.retry_delay());
        None
    }

    fn name(&self) -> &str {
        "dispose_client"
    }
}

// =============================================================================
// SHUTDOWN
// =============================================================================

struct Shutdown;

#[async_trait]
impl TransitionAction<CoordinatorState, RelayContext> for Shutdown {
    async fn execute(
        &self,
        ctx: &mut RelayContext,
        _transition: &Transition<CoordinatorState>,
    ) -> Option<CoordinatorState> {
        ctx.teardown_server();
        ctx.teardown_client();
        ctx.retry_at = None;
        if !ctx.outbound.is_empty() {
            debug!(address = %ctx.address, dropped = ctx.outbound.len(), "Discarding unsent envelopes");
            ctx.outbound.clear();
        }
        ctx.registry.close_all();
        None
    }

    fn name(&self) -> &str {
        "shutdown"
    }
}
