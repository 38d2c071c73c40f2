//! # Shared FSM - Declarative State Machine Engine
//!
//! A generic finite-state machine driven by a declared transition table.
//!
//! ## Model
//!
//! ```text
//!   transition_to(to)
//!          │
//!          ▼
//!   ┌──────────────┐   on_before_transition   ┌────────────┐
//!   │ pending FIFO │ ───────────────────────► │ table hit? │──no──► on_disallowed_transition
//!   └──────────────┘                          └────────────┘
//!          ▲                                        │ yes
//!          │                                        ▼
//!          │                              state = to, observer(ctx)
//!          │                                        │
//!          └──────── Some(next) ◄──── action.execute(ctx).await
//! ```
//!
//! - Requests are executed one at a time in submission order. An action may
//!   request a follow-up state by returning it; that request joins the back
//!   of the queue, so no two actions ever run concurrently.
//! - The state is updated *before* the action runs.
//! - The context `C` is passed explicitly to hooks and actions. Actions never
//!   capture the owner.
//!
//! ## Diagnostics
//!
//! [`StateMachine::to_plant_uml`] renders the table as a PlantUML state
//! diagram.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod action;
pub mod errors;
pub mod machine;
mod plantuml;

pub use action::{Goto, TransitionAction};
pub use errors::FsmError;
pub use machine::{StateMachine, Transition, TransitionDef};
