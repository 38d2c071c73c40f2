//! # State Machine
//!
//! Transition table, request queue and introspection.

use crate::action::TransitionAction;
use crate::errors::FsmError;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A concrete `from -> to` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<S> {
    pub from: S,
    pub to: S,
}

/// One row of the transition table.
pub struct TransitionDef<S, C> {
    pub from: S,
    pub to: S,
    pub(crate) action: Option<Arc<dyn TransitionAction<S, C>>>,
    pub(crate) description: Option<String>,
}

impl<S, C> TransitionDef<S, C> {
    /// A transition with no action.
    pub fn new(from: S, to: S) -> Self {
        Self {
            from,
            to,
            action: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: impl TransitionAction<S, C> + 'static) -> Self {
        self.action = Some(Arc::new(action));
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

type BeforeTransition<S, C> = Box<dyn Fn(&C, &Transition<S>) -> S + Send + Sync>;
type DisallowedTransition<S> = Box<dyn Fn(&S, &S) -> Result<(), FsmError<S>> + Send + Sync>;
type TransitionObserver<S, C> = Box<dyn Fn(&mut C, &Transition<S>) + Send + Sync>;

/// Finite-state machine over states `S`, acting on a context `C`.
pub struct StateMachine<S, C>
where
    S: fmt::Debug + fmt::Display,
{
    state: S,
    table: Vec<TransitionDef<S, C>>,
    pending: VecDeque<S>,
    executing: Option<Transition<S>>,
    on_before: Option<BeforeTransition<S, C>>,
    on_disallowed: DisallowedTransition<S>,
    observer: Option<TransitionObserver<S, C>>,
}

impl<S, C> StateMachine<S, C>
where
    S: Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static,
    C: Send,
{
    /// Build a machine from its initial state and table.
    ///
    /// A later row for the same `(from, to)` replaces the earlier one.
    pub fn new(initial: S, transitions: impl IntoIterator<Item = TransitionDef<S, C>>) -> Self {
        let mut table: Vec<TransitionDef<S, C>> = Vec::new();
        for def in transitions {
            match table
                .iter_mut()
                .find(|row| row.from == def.from && row.to == def.to)
            {
                Some(row) => *row = def,
                None => table.push(def),
            }
        }
        debug!(initial = %initial, transitions = table.len(), "State machine created");
        Self {
            state: initial,
            table,
            pending: VecDeque::new(),
            executing: None,
            on_before: None,
            on_disallowed: Box::new(|from: &S, to: &S| {
                Err(FsmError::DisallowedTransition {
                    from: from.clone(),
                    to: to.clone(),
                })
            }),
            observer: None,
        }
    }

    /// Hook that may redirect a requested target before it is validated.
    #[must_use]
    pub fn on_before_transition(
        mut self,
        hook: impl Fn(&C, &Transition<S>) -> S + Send + Sync + 'static,
    ) -> Self {
        self.on_before = Some(Box::new(hook));
        self
    }

    /// Replace the default handler, which fails with
    /// [`FsmError::DisallowedTransition`].
    #[must_use]
    pub fn on_disallowed_transition(
        mut self,
        handler: impl Fn(&S, &S) -> Result<(), FsmError<S>> + Send + Sync + 'static,
    ) -> Self {
        self.on_disallowed = Box::new(handler);
        self
    }

    /// Callback run after every state change, before the action.
    #[must_use]
    pub fn observe(
        mut self,
        observer: impl Fn(&mut C, &Transition<S>) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Whether the current state is any of `candidates`.
    pub fn is(&self, candidates: &[S]) -> bool {
        candidates.contains(&self.state)
    }

    /// Targets reachable from `from`, in declaration order.
    pub fn available_transitions(&self, from: &S) -> Vec<S> {
        self.table
            .iter()
            .filter(|row| &row.from == from)
            .map(|row| row.to.clone())
            .collect()
    }

    /// No outgoing transitions, or only a self-loop.
    pub fn is_final(&self, state: &S) -> bool {
        let available = self.available_transitions(state);
        available.is_empty() || (available.len() == 1 && &available[0] == state)
    }

    /// Transition currently running its action, if any.
    pub fn executing(&self) -> Option<&Transition<S>> {
        self.executing.as_ref()
    }

    /// Queue a request without running it.
    pub fn enqueue(&mut self, to: S) {
        self.pending.push_back(to);
    }

    /// Queue `to` and run every queued request to completion.
    ///
    /// On error the remaining queue is discarded.
    pub async fn transition_to(&mut self, ctx: &mut C, to: S) -> Result<(), FsmError<S>> {
        self.enqueue(to);
        self.drain(ctx).await
    }

    /// Run queued requests until the queue is empty.
    pub async fn drain(&mut self, ctx: &mut C) -> Result<(), FsmError<S>> {
        if let Some(interrupted) = self.executing.take() {
            warn!(
                from = %interrupted.from,
                to = %interrupted.to,
                "Previous transition action was interrupted"
            );
        }
        while let Some(requested) = self.pending.pop_front() {
            if let Err(e) = self.step(ctx, requested).await {
                self.pending.clear();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Transition to the single available target.
    pub async fn transition_to_next_state(&mut self, ctx: &mut C) -> Result<(), FsmError<S>> {
        let available = self.available_transitions(&self.state);
        if available.len() != 1 {
            return Err(FsmError::AmbiguousNextState {
                from: self.state.clone(),
                found: available.len(),
            });
        }
        let next = available[0].clone();
        self.transition_to(ctx, next).await
    }

    /// Transition to the first available target that is not final.
    pub async fn transition_to_next_non_final_state(
        &mut self,
        ctx: &mut C,
    ) -> Result<(), FsmError<S>> {
        let next = self
            .available_transitions(&self.state)
            .into_iter()
            .find(|to| !self.is_final(to))
            .ok_or_else(|| FsmError::NoNonFinalState {
                from: self.state.clone(),
            })?;
        self.transition_to(ctx, next).await
    }

    async fn step(&mut self, ctx: &mut C, requested: S) -> Result<(), FsmError<S>> {
        let proposed = Transition {
            from: self.state.clone(),
            to: requested,
        };
        let to = match &self.on_before {
            Some(hook) => hook(ctx, &proposed),
            None => proposed.to.clone(),
        };
        if to != proposed.to {
            debug!(requested = %proposed.to, redirected = %to, "Transition redirected");
        }

        let Some(row) = self
            .table
            .iter()
            .find(|row| row.from == self.state && row.to == to)
        else {
            return (self.on_disallowed)(&self.state, &to);
        };
        let action = row.action.clone();

        let transition = Transition {
            from: std::mem::replace(&mut self.state, to.clone()),
            to,
        };
        debug!(from = %transition.from, to = %transition.to, "Transition");
        if let Some(observer) = &self.observer {
            observer(ctx, &transition);
        }

        if let Some(action) = action {
            self.executing = Some(transition.clone());
            let next = action.execute(ctx, &transition).await;
            self.executing = None;
            if let Some(next) = next {
                self.pending.push_back(next);
            }
        }
        Ok(())
    }

    pub(crate) fn rows(&self) -> &[TransitionDef<S, C>] {
        &self.table
    }
}
