//! Generic finite-state machine used to drive the cluster controller's
//! pipeline lifecycle.
//!
//! See [`Fsm`] for the state machine itself and [`models`] for the
//! declarative shapes it is built from and the snapshot shape it publishes.

mod error;
mod fsm;
pub mod models;

pub use error::{Error, Result};
pub use fsm::Fsm;
pub use models::{FsmDeclaration, FsmSnapshot, State, StateDecl, Transition};

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_fsm() -> Fsm {
        Fsm::new(
            vec![
                State {
                    name: "A".into(),
                    description: "start".into(),
                    valid_transitions: vec![Transition::new("go", "A", "B")],
                },
                State {
                    name: "B".into(),
                    description: "end".into(),
                    valid_transitions: vec![],
                },
            ],
            "A",
            "linear",
        )
        .unwrap()
    }

    #[test]
    fn construction_rejects_unknown_to_state() {
        let err = Fsm::new(
            vec![State {
                name: "A".into(),
                description: String::new(),
                valid_transitions: vec![Transition::new("go", "A", "NOWHERE")],
            }],
            "A",
            "",
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownToState { .. }));
    }

    #[test]
    fn construction_rejects_duplicate_transition_names_within_a_state() {
        let err = Fsm::new(
            vec![
                State {
                    name: "A".into(),
                    description: String::new(),
                    valid_transitions: vec![
                        Transition::new("go", "A", "B"),
                        Transition::new("go", "A", "B"),
                    ],
                },
                State {
                    name: "B".into(),
                    description: String::new(),
                    valid_transitions: vec![],
                },
            ],
            "A",
            "",
        )
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateTransition { .. }));
    }

    #[test]
    fn terminal_state_has_no_outgoing_transitions() {
        let fsm = linear_fsm();
        assert!(!fsm.is_terminal());
    }

    #[test]
    fn transition_advances_state_and_clears_latch() {
        let mut fsm = linear_fsm();
        fsm.transition("go").unwrap();
        assert_eq!(fsm.state(), "B");
        assert!(!fsm.is_transitioning());
        assert!(fsm.is_terminal());
    }

    #[test]
    fn invalid_transition_is_rejected_with_reason() {
        let fsm = linear_fsm();
        let (can, reason) = fsm.can_transition("nope");
        assert!(!can);
        assert!(reason.contains("nope"));
    }

    #[test]
    fn begin_transition_sets_latch_and_rejects_concurrent_attempts() {
        let mut fsm = linear_fsm();
        fsm.begin_transition("go").unwrap();
        assert!(fsm.is_transitioning());

        let err = fsm.begin_transition("go").unwrap_err();
        assert!(matches!(err, Error::AlreadyTransitioning));

        fsm.complete_transition("go").unwrap();
        assert_eq!(fsm.state(), "B");
        assert!(!fsm.is_transitioning());
    }

    #[test]
    fn abort_transition_clears_latch_without_changing_state() {
        let mut fsm = linear_fsm();
        fsm.begin_transition("go").unwrap();
        fsm.abort_transition();
        assert_eq!(fsm.state(), "A");
        assert!(!fsm.is_transitioning());
    }

    #[test]
    fn default_lifecycle_round_trips_instantiate_through_reset() {
        let mut fsm = Fsm::default_lifecycle();
        for op in [
            "/instantiate",
            "/commit",
            "/preview",
            "/record",
            "/stop",
            "/collect",
            "/reset",
        ] {
            fsm.transition(op).unwrap();
        }
        assert_eq!(fsm.state(), "INITIALIZED");
    }

    #[test]
    fn default_lifecycle_allows_re_preview_from_stopped() {
        let mut fsm = Fsm::default_lifecycle();
        for op in ["/instantiate", "/commit", "/preview", "/record", "/stop"] {
            fsm.transition(op).unwrap();
        }
        assert_eq!(fsm.state(), "STOPPED");
        fsm.transition("/preview").unwrap();
        assert_eq!(fsm.state(), "PREVIEWING");
    }

    #[test]
    fn default_lifecycle_allows_reset_from_every_non_initial_state() {
        for target in [
            "/instantiate",
            "/commit",
            "/preview",
            "/record",
            "/stop",
            "/collect",
        ] {
            let mut fsm = Fsm::default_lifecycle();
            let mut state = "INITIALIZED";
            for op in ["/instantiate", "/commit", "/preview", "/record", "/stop", "/collect"] {
                fsm.transition(op).unwrap();
                state = op;
                if op == target {
                    break;
                }
            }
            let _ = state;
            fsm.transition("/reset").unwrap();
            assert_eq!(fsm.state(), "INITIALIZED");
        }
    }
}
