//! # Transition Actions
//!
//! Work attached to a transition. Runs after the state has changed.

use crate::machine::Transition;
use async_trait::async_trait;
use std::fmt;

/// An action executed when its transition fires.
///
/// The returned state, if any, is queued as the next transition request.
#[async_trait]
pub trait TransitionAction<S, C>: Send + Sync {
    /// Run the action against the owner's context.
    async fn execute(&self, ctx: &mut C, transition: &Transition<S>) -> Option<S>;

    /// Human readable name, used for diagram notes and logs.
    fn name(&self) -> &str;

    /// Whether this action only forwards to another state.
    fn is_goto(&self) -> bool {
        false
    }
}

/// Action that immediately requests another state.
#[derive(Debug, Clone)]
pub struct Goto<S> {
    to: S,
    name: String,
}

impl<S: fmt::Display> Goto<S> {
    pub fn new(to: S) -> Self {
        let name = format!("goto {to}");
        Self { to, name }
    }
}

#[async_trait]
impl<S, C> TransitionAction<S, C> for Goto<S>
where
    S: Clone + Send + Sync,
    C: Send,
{
    async fn execute(&self, _ctx: &mut C, _transition: &Transition<S>) -> Option<S> {
        Some(self.to.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_goto(&self) -> bool {
        true
    }
}
