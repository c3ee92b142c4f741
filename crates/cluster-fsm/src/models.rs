//! Declarative shapes for states and transitions
//!
//! Mirrors the FSM declaration file format consumed at controller
//! construction (name/description/valid_transitions per state).

use serde::{Deserialize, Serialize};

/// A transition between two states in a finite state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// The name of the transition, e.g. `"/commit"`.
    pub name: String,
    /// The name of the state the transition departs from.
    pub from_state: String,
    /// The name of the state the transition arrives at.
    pub to_state: String,
}

impl Transition {
    /// Construct a transition from its three parts.
    pub fn new(
        name: impl Into<String>,
        from_state: impl Into<String>,
        to_state: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            from_state: from_state.into(),
            to_state: to_state.into(),
        }
    }
}

/// A state in a finite state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// The name of the state.
    pub name: String,
    /// The valid outgoing transitions from this state. Empty means terminal.
    #[serde(default)]
    pub valid_transitions: Vec<Transition>,
    /// A human-readable description of the state.
    #[serde(default = "default_state_description")]
    pub description: String,
}

fn default_state_description() -> String {
    "A state in a finite state machine.".to_string()
}

impl State {
    /// A state with no outgoing transitions is terminal.
    pub fn is_terminal(&self) -> bool {
        self.valid_transitions.is_empty()
    }
}

/// The full declarative description of a finite state machine, as consumed
/// from the FSM declaration file (`{initial_state, description, states}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsmDeclaration {
    /// Name of the state the machine starts in.
    pub initial_state: String,
    /// Human-readable description of the whole machine.
    #[serde(default = "default_fsm_description")]
    pub description: String,
    /// Declared states, keyed by name.
    pub states: std::collections::BTreeMap<String, StateDecl>,
}

fn default_fsm_description() -> String {
    "A finite state machine.".to_string()
}

/// A single state entry within an [`FsmDeclaration`]'s `states` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDecl {
    /// Human-readable description of the state.
    #[serde(default = "default_state_description")]
    pub description: String,
    /// Outgoing transitions declared under this state.
    #[serde(default)]
    pub valid_transitions: Vec<Transition>,
}

/// A point-in-time snapshot of an FSM, suitable for serialization to
/// subscribers (`FSMSnapshot` in the wire protocol).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsmSnapshot {
    /// The state the machine currently occupies.
    pub current_state: String,
    /// The state the machine was constructed with.
    pub initial_state: String,
    /// Top-level description of the machine.
    pub description: String,
    /// Per-state description and outgoing transitions.
    pub states: std::collections::BTreeMap<String, StateDecl>,
}
