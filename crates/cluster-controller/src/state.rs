//! Wire shapes mirroring the worker runtime's `ManagerState` (§3, `ClusterState`).
//!
//! The controller never constructs a worker's internal state; it only
//! projects whatever the [`crate::runtime::WorkerRuntime`] hands back into
//! the shape published to subscribers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A registered method's metadata, as reported by a worker's node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodInfo {
    /// Method name.
    pub name: String,
    /// Declared parameter names.
    #[serde(default)]
    pub params: Vec<String>,
}

/// One node's state within a worker, as reported by the worker runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeState {
    /// Node id.
    pub id: String,
    /// Finite-state label the worker reports for this node (not the
    /// controller's own lifecycle FSM; the worker has its own per-node
    /// execution state).
    pub state: String,
    /// Registered methods the node exposes.
    #[serde(default)]
    pub methods: Vec<MethodInfo>,
}

/// One worker's state: the nodes assigned to it and their per-node state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WorkerState {
    /// Nodes currently assigned to this worker, keyed by node id.
    #[serde(default)]
    pub nodes: HashMap<String, NodeState>,
}

/// A point-in-time snapshot of the worker runtime's manager, as returned by
/// [`crate::runtime::WorkerRuntime::state`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ManagerState {
    /// Manager id.
    #[serde(default)]
    pub id: String,
    /// Manager's advertised IP address.
    #[serde(default)]
    pub ip: String,
    /// Manager's listening port.
    #[serde(default)]
    pub port: u16,
    /// Per-worker state, keyed by worker id.
    #[serde(default)]
    pub workers: HashMap<String, WorkerState>,
    /// Whether a log sink is currently attached.
    #[serde(default)]
    pub log_sink_enabled: bool,
}

/// `ClusterState` (§3): a [`ManagerState`] snapshot augmented with the
/// zeroconf flag the controller itself tracks (the manager state alone
/// doesn't carry it — zeroconf is toggled through the controller, not the
/// worker runtime's own state machinery).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ClusterState {
    /// Manager id.
    pub id: String,
    /// Manager's advertised IP address.
    pub ip: String,
    /// Manager's listening port.
    pub port: u16,
    /// Per-worker state, keyed by worker id.
    pub workers: HashMap<String, WorkerState>,
    /// Whether zeroconf discovery is currently enabled.
    pub zeroconf_discovery: bool,
    /// Whether a log sink is currently attached.
    pub log_sink_enabled: bool,
}

impl ClusterState {
    /// Project a [`ManagerState`] into a [`ClusterState`], stamping in the
    /// controller's current zeroconf flag.
    pub fn from_manager_state(state: ManagerState, zeroconf_discovery: bool) -> Self {
        Self {
            id: state.id,
            ip: state.ip,
            port: state.port,
            workers: state.workers,
            zeroconf_discovery,
            log_sink_enabled: state.log_sink_enabled,
        }
    }
}
