//! The pipeline-update envelope published on the controller's pipeline
//! broadcaster (§3 "Update message", §6 "Pipeline-update envelope").

use cluster_fsm::FsmSnapshot;
use cluster_pipeline::WebPipeline;
use serde::{Deserialize, Serialize};

/// `{fsm, pipeline}`, published after every lifecycle attempt (successful or
/// failed) and replayed immediately to a newly-subscribed pipeline observer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineUpdate {
    /// The FSM's state at publish time.
    pub fsm: FsmSnapshot,
    /// The active pipeline's web-JSON projection, if one is set.
    pub pipeline: Option<WebPipeline>,
    /// The failed operation's error message, set only when this update
    /// reports a transition that did not advance the FSM.
    #[serde(default)]
    pub error: Option<String>,
}

/// `get_states_info()` (§4.5): the FSM snapshot augmented with the active
/// pipeline id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatesInfo {
    /// The FSM's current snapshot.
    pub fsm: FsmSnapshot,
    /// The currently active pipeline's id, if any.
    pub active_pipeline_id: Option<String>,
}
