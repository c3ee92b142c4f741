//! Error types for the finite-state machine

use thiserror::Error;

/// Result type alias for FSM operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or driving an [`crate::Fsm`]
#[derive(Debug, Error)]
pub enum Error {
    /// A transition's `to_state` does not name a declared state
    #[error("transition `{transition}` targets unknown state `{to_state}`")]
    UnknownToState {
        /// Name of the offending transition
        transition: String,
        /// The dangling target state name
        to_state: String,
    },

    /// The same transition name is declared twice under one state
    #[error("state `{state}` declares transition `{transition}` more than once")]
    DuplicateTransition {
        /// State under which the duplicate was found
        state: String,
        /// The duplicated transition name
        transition: String,
    },

    /// The declaration's `initial_state` does not name a declared state
    #[error("initial state `{0}` is not declared")]
    UnknownInitialState(String),

    /// Attempted a transition not listed among the current state's outgoing transitions
    #[error("invalid transition `{transition}` from state `{from_state}`")]
    InvalidTransition {
        /// Transition name that was attempted
        transition: String,
        /// Current state at the time of the attempt
        from_state: String,
    },

    /// A transition was attempted while another was already in flight
    #[error("cannot transition while another transition is in flight")]
    AlreadyTransitioning,

    /// The current state has no outgoing transitions
    #[error("state `{0}` is terminal; no further transitions are possible")]
    Terminal(String),
}
