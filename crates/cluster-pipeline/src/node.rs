//! The wrapped node: a concrete occurrence of a registered template inside
//! one pipeline.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::NodeKind;

/// An opaque handle standing in for the worker layer's materialized node
/// instance. Concrete node execution lives in the worker runtime, out of
/// scope for this crate; the handle only needs an id so
/// `worker_graph_mapping` can address it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHandle {
    /// The instance id the worker runtime assigned.
    pub id: String,
}

/// A concrete occurrence of a registered template inside one pipeline.
///
/// Invariant: a wrapped node is either uninstantiated (`instance` is
/// `None`, parameters and worker assignment may be mutated) or instantiated
/// (`instance` is `Some`, immutable). The invariant is enforced by the
/// owning [`crate::Pipeline`], not by this type alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedNode {
    /// Unique id within the owning pipeline.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Name of the template this node was created from.
    pub registry_name: String,
    /// Package qualifier of the template, if any.
    pub package: Option<String>,
    /// SOURCE, STEP, or SINK, copied from the template at creation time.
    pub kind: NodeKind,
    /// Bound constructor parameters (template defaults overridden by
    /// caller-supplied values).
    #[serde(default)]
    pub params: HashMap<String, Value>,
    /// The worker this node is assigned to run on, if any.
    #[serde(default)]
    pub worker_id: Option<String>,
    /// Present once the owning pipeline has been instantiated.
    #[serde(default)]
    pub instance: Option<InstanceHandle>,
}

impl WrappedNode {
    /// Whether this node has been materialized by the worker layer.
    pub fn is_instantiated(&self) -> bool {
        self.instance.is_some()
    }

    /// Project this node into its web-JSON shape.
    pub fn to_web_node(&self) -> WebNode {
        WebNode {
            id: Some(self.id.clone()),
            name: self.name.clone(),
            registry_name: self.registry_name.clone(),
            package: self.package.clone(),
            kind: Some(self.kind),
            params: self.params.clone(),
            worker_id: self.worker_id.clone(),
        }
    }

    /// Apply a web-JSON projection's mutable fields (name, params, worker
    /// assignment). Caller is responsible for refusing this on
    /// instantiated nodes and for id/kind matching.
    pub fn apply_web_node(&mut self, web_node: &WebNode) {
        self.name = web_node.name.clone();
        self.params = web_node.params.clone();
        self.worker_id = web_node.worker_id.clone();
    }
}

/// The web-facing projection of a [`WrappedNode`], used for `to_web_json` /
/// `update_from_web_json` round-trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebNode {
    /// Node id; `None` when describing a node to be created.
    #[serde(default)]
    pub id: Option<String>,
    /// Human-readable name.
    pub name: String,
    /// Name of the template this node was (or will be) created from.
    pub registry_name: String,
    /// Package qualifier of the template, if any.
    #[serde(default)]
    pub package: Option<String>,
    /// SOURCE, STEP, or SINK.
    #[serde(default)]
    pub kind: Option<NodeKind>,
    /// Bound constructor parameters.
    #[serde(default)]
    pub params: HashMap<String, Value>,
    /// The worker this node is assigned to run on, if any.
    #[serde(default)]
    pub worker_id: Option<String>,
}

/// The web-facing projection of an edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebEdge {
    /// Edge id.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Sink node id.
    pub sink: String,
}
