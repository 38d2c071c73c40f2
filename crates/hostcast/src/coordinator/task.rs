//! The coordinator task: one per rendezvous address.
//!
//! Owns the state machine and its context. Everything that can happen to a
//! coordinator is a branch of one `select!`: a local command, a shutdown
//! request, an accepted socket, a link event or the retry timer. Each is
//! handled to completion before the next is polled. Network waits (dials,
//! handshakes, socket reads) run in their own tasks and report back as link
//! events, so local delivery never waits on the network.

use super::context::RelayContext;
use super::transitions;
use super::Command;
use crate::error::RelayError;
use crate::network::{self, LinkEvent};
use shared_bus::RelayEvent;
use shared_fsm::{FsmError, StateMachine, Transition};
use shared_types::CoordinatorState;
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

type Machine = StateMachine<CoordinatorState, RelayContext>;

/// Build the election machine with its close redirect and observer.
pub(super) fn election_machine() -> Machine {
    with_hooks(StateMachine::new(
        CoordinatorState::ServerWannabe,
        transitions::table(),
    ))
}

fn with_hooks(machine: Machine) -> Machine {
    machine
        .on_before_transition(
            |ctx: &RelayContext, transition: &Transition<CoordinatorState>| {
                if ctx.is_closing() {
                    CoordinatorState::Closed
                } else {
                    transition.to
                }
            },
        )
        .observe(
            |ctx: &mut RelayContext, transition: &Transition<CoordinatorState>| {
                ctx.state_changed(transition);
            },
        )
}

enum Step {
    Command(Option<Command>),
    Shutdown,
    Accepted(io::Result<(TcpStream, SocketAddr)>),
    Link(LinkEvent),
    Retry,
}

pub(super) struct RelayTask {
    pub(super) machine: Machine,
    pub(super) ctx: RelayContext,
    pub(super) commands: mpsc::UnboundedReceiver<Command>,
    pub(super) links: mpsc::UnboundedReceiver<LinkEvent>,
    pub(super) shutdown: watch::Receiver<bool>,
    pub(super) finished: watch::Sender<bool>,
    pub(super) predecessor: Option<watch::Receiver<bool>>,
    pub(super) on_retired: Option<Box<dyn FnOnce() + Send>>,
}

impl RelayTask {
    pub(super) async fn run(mut self) {
        if let Some(mut predecessor) = self.predecessor.take() {
            debug!(address = %self.ctx.address, "Waiting for previous coordinator to release the address");
            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = predecessor.wait_for(|finished| *finished) => {}
                () = closed_signal(&mut shutdown) => {}
            }
        }

        let started = self
            .machine
            .transition_to_next_non_final_state(&mut self.ctx)
            .await;
        let mut failed = match started {
            Ok(()) => false,
            Err(e) => {
                self.abort(e);
                true
            }
        };

        while !failed && !self.machine.is(&[CoordinatorState::Closed]) {
            if self.ctx.is_closing() {
                failed = !self.transition(CoordinatorState::Closed).await;
                continue;
            }

            let retry_at = self.ctx.retry_at;
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                _ = self.shutdown.changed() => Step::Shutdown,
                accepted = network::accept_next(self.ctx.listener.as_ref()) => Step::Accepted(accepted),
                Some(event) = self.links.recv() => Step::Link(event),
                () = retry_sleep(retry_at) => Step::Retry,
            };

            failed = !self.handle(step).await;
        }

        self.retire();
    }

    /// Returns `false` if the machine failed.
    async fn handle(&mut self, step: Step) -> bool {
        match step {
            Step::Command(Some(Command::Register(handle))) => self.ctx.register(handle),
            Step::Command(Some(Command::Unregister { name, id })) => self.ctx.unregister(&name, &id),
            Step::Command(Some(Command::Post(envelope))) => self.ctx.post(envelope),
            // Every `Coordinator` clone is gone.
            Step::Command(None) | Step::Shutdown => self.ctx.request_close(),
            Step::Accepted(Ok((stream, remote))) => self.upgrade(stream, remote),
            Step::Accepted(Err(e)) => {
                let error = RelayError::accept(&e);
                if error.is_expected() {
                    debug!(address = %self.ctx.address, error = %error, "Accept interrupted");
                } else {
                    self.ctx.fault(error);
                    return self.transition(CoordinatorState::ServerFailed).await;
                }
            }
            Step::Link(event) => return self.link_event(event).await,
            Step::Retry => {
                self.ctx.retry_at = None;
                return self.transition(CoordinatorState::ServerWannabe).await;
            }
        }
        true
    }

    async fn link_event(&mut self, event: LinkEvent) -> bool {
        match event {
            LinkEvent::Upgraded { stream, remote } => {
                if self.ctx.state != CoordinatorState::Server {
                    debug!(address = %self.ctx.address, remote = %remote, "Dropping connection, no longer hub");
                    return true;
                }
                let id = self.ctx.next_link_id();
                let link = network::PeerLink::spawn(
                    id,
                    remote.to_string(),
                    stream,
                    self.ctx.links.clone(),
                    self.ctx.config.max_message_bytes,
                );
                debug!(address = %self.ctx.address, remote = %remote, link = id, "Peer connected");
                self.ctx.peers.insert(id, link);
                self.ctx.publish(RelayEvent::PeerConnected {
                    address: self.ctx.address.clone(),
                    remote: remote.to_string(),
                });
            }
            // Anything that is not a WebSocket client, e.g. a browser or a
            // port scanner. Nothing local is affected.
            LinkEvent::UpgradeFailed { remote, error } => {
                debug!(address = %self.ctx.address, remote = %remote, error = %error, "Rejected inbound handshake");
                self.ctx.publish(RelayEvent::HandshakeRejected {
                    address: self.ctx.address.clone(),
                    remote: remote.to_string(),
                    reason: error.to_string(),
                });
            }
            LinkEvent::Connected { id, stream } => {
                if !self.ctx.take_dial(id) {
                    debug!(address = %self.ctx.address, link = id, "Dropping abandoned hub connection");
                    return true;
                }
                self.ctx.hub = Some(network::PeerLink::spawn(
                    id,
                    self.ctx.address.to_string(),
                    stream,
                    self.ctx.links.clone(),
                    self.ctx.config.max_message_bytes,
                ));
                return self.transition(CoordinatorState::Client).await;
            }
            LinkEvent::ConnectFailed { id, error } => {
                if !self.ctx.take_dial(id) {
                    return true;
                }
                self.ctx.fault(error);
                return self.transition(CoordinatorState::ClientFailed).await;
            }
            LinkEvent::Inbound { id, envelope, raw } => self.ctx.inbound(id, &envelope, raw),
            LinkEvent::Malformed { id, error } => {
                warn!(address = %self.ctx.address, link = id, error = %error, "Dropping malformed frame");
                self.ctx.publish(RelayEvent::DecodeFailed {
                    address: self.ctx.address.clone(),
                    reason: error.to_string(),
                });
            }
            LinkEvent::Closed { id, error } => {
                if let Some(peer) = self.ctx.peers.remove(&id) {
                    debug!(address = %self.ctx.address, remote = %peer.remote(), "Peer disconnected");
                    self.ctx.publish(RelayEvent::PeerDisconnected {
                        address: self.ctx.address.clone(),
                        remote: peer.remote().to_string(),
                    });
                    peer.close();
                    if let Some(error) = error {
                        self.ctx.fault(error);
                    }
                } else if self.ctx.hub.as_ref().is_some_and(|hub| hub.id() == id) {
                    info!(address = %self.ctx.address, "Lost connection to hub");
                    self.ctx.publish(RelayEvent::HubLost {
                        address: self.ctx.address.clone(),
                    });
                    if let Some(error) = error {
                        self.ctx.fault(error);
                    }
                    return self.transition(CoordinatorState::ClientFailed).await;
                }
            }
        }
        true
    }

    /// Finish the WebSocket handshake off the task, reporting back as a
    /// link event.
    fn upgrade(&self, stream: TcpStream, remote: SocketAddr) {
        let links = self.ctx.links.clone();
        let timeout = self.ctx.config.connect_timeout();
        tokio::spawn(async move {
            let event = match tokio::time::timeout(timeout, network::upgrade(stream)).await {
                Ok(Ok(stream)) => LinkEvent::Upgraded { stream, remote },
                Ok(Err(error)) => LinkEvent::UpgradeFailed { remote, error },
                Err(_) => LinkEvent::UpgradeFailed {
                    remote,
                    error: RelayError::ConnectTimeout {
                        address: remote.to_string(),
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    },
                },
            };
            let _ = links.send(event);
        });
    }

    /// Returns `false` if the machine failed.
    async fn transition(&mut self, to: CoordinatorState) -> bool {
        match self.machine.transition_to(&mut self.ctx, to).await {
            Ok(()) => true,
            Err(e) => {
                self.abort(e);
                false
            }
        }
    }

    /// A rejected transition is a bug in the table. Stop this coordinator,
    /// not the process.
    fn abort(&mut self, e: FsmError<CoordinatorState>) {
        error!(address = %self.ctx.address, error = %e, "Election state machine failed");
        self.ctx
            .registry
            .broadcast_error(&RelayError::Transition(e.to_string()));
        self.ctx.teardown_server();
        self.ctx.teardown_client();
        self.ctx.registry.close_all();
    }

    fn retire(mut self) {
        // Registrations that raced with shutdown still get their close event.
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Register(handle) = command {
                handle.mark_closed();
            }
        }

        self.finished.send_replace(true);
        info!(address = %self.ctx.address, "Coordinator closed");
        self.ctx.publish(RelayEvent::CoordinatorClosed {
            address: self.ctx.address.clone(),
        });
        if let Some(on_retired) = self.on_retired.take() {
            on_retired();
        }
    }
}

/// Resolves once close is requested or the coordinator handle is gone.
async fn closed_signal(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let closed = *shutdown.borrow_and_update();
        if closed || shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn retry_sleep(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
