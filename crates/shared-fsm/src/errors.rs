//! # Error Types

use std::fmt;
use thiserror::Error;

/// Errors raised by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsmError<S: fmt::Debug + fmt::Display> {
    /// `(from, to)` is not in the transition table.
    #[error("Transition from {from} to {to} is not allowed.")]
    DisallowedTransition { from: S, to: S },

    /// `transition_to_next_state` needs exactly one candidate.
    #[error("Expected exactly one available transition from {from}, found {found}.")]
    AmbiguousNextState { from: S, found: usize },

    /// `transition_to_next_non_final_state` found nothing to do.
    #[error("Expected at least one available non-final transition from {from}, found none.")]
    NoNonFinalState { from: S },
}
