//! The generic finite-state machine

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::models::{FsmDeclaration, FsmSnapshot, State, StateDecl, Transition};

/// A generic finite-state machine.
///
/// Built from a declarative description (see [`FsmDeclaration`]); drives a
/// single `current_state` through named transitions, with a `transitioning`
/// latch that callers can use to serialize state changes (see
/// `cluster-controller`'s single-flight discipline, which composes
/// [`Fsm::begin_transition`] / [`Fsm::complete_transition`] /
/// [`Fsm::abort_transition`] around an in-flight asynchronous operation).
///
/// `Fsm` itself has no internal synchronization: callers that share an `Fsm`
/// across tasks are expected to guard it with their own lock, exactly as
/// `cluster-controller` does.
#[derive(Debug, Clone)]
pub struct Fsm {
    states: BTreeMap<String, State>,
    initial_state: String,
    current_state: String,
    description: String,
    transitioning: bool,
}

impl Fsm {
    /// Build an FSM from a list of states and an initial state name.
    ///
    /// Every transition's `to_state` must reference a declared state, or
    /// construction fails with [`Error::UnknownToState`]. Transition names
    /// must be unique within the state that declares them, or construction
    /// fails with [`Error::DuplicateTransition`]. A transition name may
    /// legitimately repeat across different states (e.g. `/reset` reachable
    /// from every non-terminal state) — that repetition is not validated
    /// further, matching how the machine is actually driven: only the
    /// current state's own transition list is ever consulted.
    pub fn new(
        states: Vec<State>,
        initial_state: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        let initial_state = initial_state.into();
        let description = description.into();

        let mut by_name: BTreeMap<String, State> = BTreeMap::new();
        for state in states {
            by_name.insert(state.name.clone(), state);
        }

        if !by_name.contains_key(&initial_state) {
            return Err(Error::UnknownInitialState(initial_state));
        }

        for state in by_name.values() {
            let mut seen = std::collections::HashSet::new();
            for transition in &state.valid_transitions {
                if !seen.insert(&transition.name) {
                    return Err(Error::DuplicateTransition {
                        state: state.name.clone(),
                        transition: transition.name.clone(),
                    });
                }
                if !by_name.contains_key(&transition.to_state) {
                    return Err(Error::UnknownToState {
                        transition: transition.name.clone(),
                        to_state: transition.to_state.clone(),
                    });
                }
            }
        }

        Ok(Self {
            current_state: initial_state.clone(),
            states: by_name,
            initial_state,
            description,
            transitioning: false,
        })
    }

    /// Build an FSM from its declarative JSON/YAML shape.
    pub fn from_declaration(decl: FsmDeclaration) -> Result<Self> {
        let states = decl
            .states
            .into_iter()
            .map(|(name, StateDecl { description, valid_transitions })| State {
                name,
                description,
                valid_transitions,
            })
            .collect();
        Self::new(states, decl.initial_state, decl.description)
    }

    /// The built-in lifecycle FSM described in the specification:
    /// `INITIALIZED -> INSTANTIATED -> COMMITTED -> PREVIEWING -> RECORDING
    /// -> STOPPED -> COLLECTED -> INITIALIZED`, with `/reset` reachable from
    /// every non-terminal post-`INITIALIZED` state and `/preview` reachable
    /// again from `STOPPED`.
    pub fn default_lifecycle() -> Self {
        let decl: FsmDeclaration = serde_json::from_str(include_str!("default_states.json"))
            .expect("default_states.json is a well-formed FsmDeclaration");
        Self::from_declaration(decl).expect("default lifecycle FSM is internally consistent")
    }

    /// Name of the state the machine currently occupies.
    pub fn state(&self) -> &str {
        &self.current_state
    }

    /// Whether the current state has no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        self.current_state().is_terminal()
    }

    /// Whether a transition is currently in flight.
    pub fn is_transitioning(&self) -> bool {
        self.transitioning
    }

    fn current_state(&self) -> &State {
        self.states
            .get(&self.current_state)
            .expect("current_state always names a declared state")
    }

    fn find_outgoing(&self, name: &str) -> Option<&Transition> {
        self.current_state()
            .valid_transitions
            .iter()
            .find(|t| t.name == name)
    }

    /// Whether `name` is an applicable transition from the current state.
    ///
    /// Returns `(true, "")` if applicable; otherwise `(false, reason)`.
    pub fn can_transition(&self, name: &str) -> (bool, String) {
        if self.transitioning {
            return (false, "Cannot transition while transitioning".to_string());
        }
        if self.find_outgoing(name).is_some() {
            (true, String::new())
        } else {
            (
                false,
                format!(
                    "Invalid transition: {name} from state {} is not possible",
                    self.current_state
                ),
            )
        }
    }

    /// Begin a transition: validates it is applicable and sets the latch.
    ///
    /// Does not change `current_state` yet — pair with
    /// [`Fsm::complete_transition`] on success or [`Fsm::abort_transition`]
    /// on failure. This is the seam the controller's asynchronous
    /// single-flight orchestration uses; [`Fsm::transition`] is the
    /// synchronous all-in-one convenience built from the same primitives.
    pub fn begin_transition(&mut self, name: &str) -> Result<()> {
        if self.transitioning {
            return Err(Error::AlreadyTransitioning);
        }
        if self.is_terminal() {
            return Err(Error::Terminal(self.current_state.clone()));
        }
        if self.find_outgoing(name).is_none() {
            return Err(Error::InvalidTransition {
                transition: name.to_string(),
                from_state: self.current_state.clone(),
            });
        }
        self.transitioning = true;
        Ok(())
    }

    /// Complete a transition previously started with [`Fsm::begin_transition`]
    /// for the same `name`, advancing `current_state` and clearing the latch.
    pub fn complete_transition(&mut self, name: &str) -> Result<()> {
        let to_state = self
            .find_outgoing(name)
            .ok_or_else(|| Error::InvalidTransition {
                transition: name.to_string(),
                from_state: self.current_state.clone(),
            })?
            .to_state
            .clone();
        self.current_state = to_state;
        self.transitioning = false;
        Ok(())
    }

    /// Abort an in-flight transition without changing state, clearing the latch.
    pub fn abort_transition(&mut self) {
        self.transitioning = false;
    }

    /// Perform a named transition synchronously: validate, apply, clear the
    /// latch, in one call. Equivalent to `begin_transition` immediately
    /// followed by `complete_transition`.
    pub fn transition(&mut self, name: &str) -> Result<()> {
        self.begin_transition(name)?;
        self.complete_transition(name)
    }

    /// A snapshot of current/initial state and the full state table,
    /// suitable for serialization to subscribers.
    pub fn snapshot(&self) -> FsmSnapshot {
        FsmSnapshot {
            current_state: self.current_state.clone(),
            initial_state: self.initial_state.clone(),
            description: self.description.clone(),
            states: self
                .states
                .iter()
                .map(|(name, state)| {
                    (
                        name.clone(),
                        StateDecl {
                            description: state.description.clone(),
                            valid_transitions: state.valid_transitions.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// `to_dict()` from the specification: alias for [`Fsm::snapshot`]
    /// serialized to a `serde_json::Value`.
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).expect("FsmSnapshot always serializes")
    }
}
