//! The pipeline DAG: nodes, typed edges, and the instantiate/destroy
//! lifecycle.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::node::{InstanceHandle, WebEdge, WebNode, WrappedNode};
use crate::registry::NodeRegistry;

/// The web-facing projection of an entire pipeline, used by
/// `to_web_json`/`update_from_web_json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebPipeline {
    /// Pipeline id.
    pub id: String,
    /// Pipeline name.
    pub name: String,
    /// Pipeline description.
    #[serde(default)]
    pub description: String,
    /// Whether the pipeline has been instantiated.
    pub instantiated: bool,
    /// Whether the pipeline's graph has been committed to the worker runtime.
    #[serde(default)]
    pub committed: bool,
    /// Nodes, in insertion order is not guaranteed.
    pub nodes: Vec<WebNode>,
    /// Edges.
    pub edges: Vec<WebEdge>,
}

/// A directed acyclic graph of [`WrappedNode`]s connected by typed edges.
///
/// Mutation (`add_node`, `remove_node`, `add_edge`, `remove_edge`,
/// `update_from_web_json`) is only permitted while the pipeline is
/// uninstantiated; see [`Pipeline::instantiate`].
#[derive(Debug, Clone)]
pub struct Pipeline {
    id: String,
    name: String,
    description: String,
    nodes: HashMap<String, WrappedNode>,
    edges: HashMap<String, (String, String)>,
    instantiated: bool,
    committed: bool,
}

impl Pipeline {
    /// Construct an empty pipeline.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            nodes: HashMap::new(),
            edges: HashMap::new(),
            instantiated: false,
            committed: false,
        }
    }

    /// This pipeline's id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// This pipeline's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the pipeline has been instantiated.
    pub fn is_instantiated(&self) -> bool {
        self.instantiated
    }

    /// Whether the pipeline's graph has been committed to the worker
    /// runtime. `committed` implies `instantiated`.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Record that the worker runtime has accepted this pipeline's graph.
    /// The caller (the controller) is responsible for having already called
    /// the worker runtime; this only updates the in-memory flag. Refused on
    /// an uninstantiated pipeline, preserving `committed implies
    /// instantiated`.
    pub fn set_committed(&mut self, committed: bool) -> Result<()> {
        if committed && !self.instantiated {
            return Err(Error::InstantiationRefused(
                "cannot mark an uninstantiated pipeline committed".to_string(),
            ));
        }
        self.committed = committed;
        Ok(())
    }

    /// Look up a node by id.
    pub fn node(&self, node_id: &str) -> Result<&WrappedNode> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))
    }

    /// Iterate over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &WrappedNode> {
        self.nodes.values()
    }

    /// Iterate over all edges as `(edge_id, source_id, sink_id)`.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.edges
            .iter()
            .map(|(id, (source, sink))| (id.as_str(), source.as_str(), sink.as_str()))
    }

    fn guard_mutable(&self) -> Result<()> {
        if self.instantiated {
            return Err(Error::Frozen(self.id.clone()));
        }
        Ok(())
    }

    /// Bind a registered template into a new node in this pipeline.
    pub fn add_node(
        &mut self,
        registry: &NodeRegistry,
        registry_name: &str,
        package: Option<&str>,
        params: HashMap<String, Value>,
    ) -> Result<WrappedNode> {
        self.guard_mutable()?;
        let template = registry.get(registry_name, package)?;
        let bound = template.bind(&params);
        let node = WrappedNode {
            id: Uuid::new_v4().to_string(),
            name: registry_name.to_string(),
            registry_name: template.registry_name.clone(),
            package: template.package.clone(),
            kind: template.kind,
            params: bound,
            worker_id: None,
            instance: None,
        };
        self.nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    /// Remove a node and every edge incident to it.
    pub fn remove_node(&mut self, node_id: &str) -> Result<WrappedNode> {
        self.guard_mutable()?;
        let node = self
            .nodes
            .remove(node_id)
            .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))?;
        self.edges
            .retain(|_, (source, sink)| source != node_id && sink != node_id);
        Ok(node)
    }

    fn edge_between(&self, source: &str, sink: &str) -> Option<(&String, &(String, String))> {
        self.edges
            .iter()
            .find(|(_, (s, t))| s == source && t == sink)
    }

    /// Whether an edge already connects `source` to `sink`.
    pub fn has_edge(&self, source: &str, sink: &str) -> bool {
        self.edge_between(source, sink).is_some()
    }

    /// Returns `true` if `target` is reachable from `start` by following
    /// edges forward, used to reject edges that would close a cycle.
    fn reachable(&self, start: &str, target: &str) -> bool {
        let mut stack = vec![start.to_string()];
        let mut seen: HashSet<String> = HashSet::new();
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if !seen.insert(node.clone()) {
                continue;
            }
            for (_, (s, t)) in self.edges.iter() {
                if s == &node {
                    stack.push(t.clone());
                }
            }
        }
        false
    }

    /// Connect `source` to `sink`, validating node kinds and rejecting
    /// cycles. Idempotent: re-adding an existing edge returns it unchanged.
    pub fn add_edge(
        &mut self,
        source: &str,
        sink: &str,
        edge_id: Option<String>,
    ) -> Result<WebEdge> {
        self.guard_mutable()?;
        if let Some((id, _)) = self.edge_between(source, sink) {
            return Ok(WebEdge {
                id: id.clone(),
                source: source.to_string(),
                sink: sink.to_string(),
            });
        }

        let source_node = self.node(source)?;
        if !source_node.kind.can_be_source() {
            return Err(Error::InvalidNode {
                node_id: source.to_string(),
                kind: source_node.kind.to_string(),
                role: "source",
                reason: "SINK nodes cannot originate an edge".to_string(),
            });
        }
        let sink_node = self.node(sink)?;
        if !sink_node.kind.can_be_sink() {
            return Err(Error::InvalidNode {
                node_id: sink.to_string(),
                kind: sink_node.kind.to_string(),
                role: "sink",
                reason: "SOURCE nodes cannot terminate an edge".to_string(),
            });
        }

        // Would connecting source -> sink let sink reach back to source?
        if self.reachable(sink, source) {
            return Err(Error::NotADag {
                source: source.to_string(),
                sink: sink.to_string(),
            });
        }

        let id = edge_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        self.edges
            .insert(id.clone(), (source.to_string(), sink.to_string()));
        tracing::debug!(pipeline_id = %self.id, edge_id = %id, source, sink, "added edge");
        Ok(WebEdge {
            id,
            source: source.to_string(),
            sink: sink.to_string(),
        })
    }

    /// Remove the edge between `source` and `sink`, verifying `edge_id` if
    /// supplied.
    pub fn remove_edge(
        &mut self,
        source: &str,
        sink: &str,
        edge_id: Option<&str>,
    ) -> Result<WebEdge> {
        self.guard_mutable()?;
        let key = format!("{source}->{sink}");
        let (id, _) = self
            .edge_between(source, sink)
            .map(|(id, pair)| (id.clone(), pair.clone()))
            .ok_or(Error::EdgeNotFound(key))?;
        if let Some(expected) = edge_id {
            if expected != id {
                return Err(Error::EdgeIdMismatch {
                    source: source.to_string(),
                    sink: sink.to_string(),
                    expected: expected.to_string(),
                });
            }
        }
        self.edges.remove(&id);
        Ok(WebEdge {
            id,
            source: source.to_string(),
            sink: sink.to_string(),
        })
    }

    /// Whether every node has a worker assignment, the precondition for
    /// [`Pipeline::instantiate`].
    pub fn can_instantiate(&self) -> bool {
        !self.instantiated && self.nodes.values().all(|n| n.worker_id.is_some())
    }

    /// Assign a node to a worker.
    pub fn assign_worker(&mut self, node_id: &str, worker_id: impl Into<String>) -> Result<()> {
        self.guard_mutable()?;
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))?;
        node.worker_id = Some(worker_id.into());
        Ok(())
    }

    /// Materialize every node, refusing if already instantiated or if any
    /// node lacks a worker assignment.
    pub fn instantiate(&mut self) -> Result<()> {
        if self.instantiated {
            return Err(Error::InstantiationRefused(
                "pipeline is already instantiated".to_string(),
            ));
        }
        if !self.can_instantiate() {
            return Err(Error::InstantiationRefused(
                "every node must carry a worker assignment before instantiation".to_string(),
            ));
        }
        for node in self.nodes.values_mut() {
            node.instance = Some(InstanceHandle {
                id: Uuid::new_v4().to_string(),
            });
        }
        self.instantiated = true;
        tracing::info!(pipeline_id = %self.id, nodes = self.nodes.len(), "pipeline instantiated");
        Ok(())
    }

    /// `worker_id -> [instance_id, ...]`, valid only once instantiated.
    pub fn worker_graph_mapping(&self) -> Result<HashMap<String, Vec<String>>> {
        if !self.instantiated {
            return Err(Error::InstantiationRefused(
                "pipeline has not been instantiated".to_string(),
            ));
        }
        let mut mapping: HashMap<String, Vec<String>> = HashMap::new();
        for node in self.nodes.values() {
            let worker_id = node.worker_id.clone().unwrap_or_default();
            let instance_id = node
                .instance
                .as_ref()
                .map(|h| h.id.clone())
                .unwrap_or_default();
            mapping.entry(worker_id).or_default().push(instance_id);
        }
        Ok(mapping)
    }

    /// Release every node's instance handle, returning to the uninstantiated
    /// state.
    pub fn destroy(&mut self) {
        for node in self.nodes.values_mut() {
            node.instance = None;
        }
        self.instantiated = false;
        self.committed = false;
    }

    /// Project this pipeline into its web-JSON shape.
    pub fn to_web_json(&self) -> WebPipeline {
        WebPipeline {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            instantiated: self.instantiated,
            committed: self.committed,
            nodes: self.nodes.values().map(|n| n.to_web_node()).collect(),
            edges: self
                .edges
                .iter()
                .map(|(id, (source, sink))| WebEdge {
                    id: id.clone(),
                    source: source.clone(),
                    sink: sink.clone(),
                })
                .collect(),
        }
    }

    /// Apply a web-JSON projection's mutable fields: pipeline name and
    /// description, and per-node name/params/worker assignment. Rejected on
    /// an instantiated pipeline, on a pipeline id mismatch, and on any
    /// unknown node or edge id.
    pub fn update_from_web_json(&mut self, web: &WebPipeline) -> Result<WebPipeline> {
        self.guard_mutable()?;
        if web.id != self.id {
            return Err(Error::PipelineIdMismatch {
                expected: self.id.clone(),
                found: web.id.clone(),
            });
        }
        for web_node in &web.nodes {
            let node_id = web_node
                .id
                .as_deref()
                .ok_or_else(|| Error::NodeNotFound("<missing id>".to_string()))?;
            let node = self
                .nodes
                .get_mut(node_id)
                .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))?;
            node.apply_web_node(web_node);
        }
        for web_edge in &web.edges {
            if !self.has_edge(&web_edge.source, &web_edge.sink) {
                return Err(Error::EdgeNotFound(web_edge.id.clone()));
            }
        }
        self.name = web.name.clone();
        self.description = web.description.clone();
        Ok(self.to_web_json())
    }

    /// Build a pipeline from a declarative [`PipelineConfig`], resolving
    /// node templates against `registry`. Worker assignments in
    /// `config.mappings` are left unset; applying them is the caller's
    /// responsibility once the worker runtime is available.
    pub fn from_config(config: &PipelineConfig, registry: &NodeRegistry) -> Result<Self> {
        let mut pipeline = Pipeline::new(config.name.clone(), config.description.clone());
        let mut name_to_id: HashMap<String, String> = HashMap::new();
        for entry in &config.nodes {
            let node_config = entry.clone().into_full();
            let wrapped = pipeline.add_node(
                registry,
                &node_config.registry_name,
                node_config.package.as_deref(),
                node_config.kwargs.clone(),
            )?;
            if let Some(stored) = pipeline.nodes.get_mut(&wrapped.id) {
                stored.name = node_config.name.clone();
            }
            name_to_id.insert(node_config.name, wrapped.id);
        }
        for (source_name, sink_name) in &config.adj {
            let source_id = name_to_id
                .get(source_name)
                .ok_or_else(|| Error::NodeNotFound(source_name.clone()))?
                .clone();
            let sink_id = name_to_id
                .get(sink_name)
                .ok_or_else(|| Error::NodeNotFound(sink_name.clone()))?
                .clone();
            pipeline.add_edge(&source_id, &sink_id, None)?;
        }
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{NodeKind, NodeTemplate};

    fn registry() -> NodeRegistry {
        let mut r = NodeRegistry::new();
        r.register(NodeTemplate::new("cam", None, NodeKind::Source));
        r.register(NodeTemplate::new("filter", None, NodeKind::Step));
        r.register(NodeTemplate::new("writer", None, NodeKind::Sink));
        r
    }

    #[test]
    fn add_node_binds_template_defaults() {
        let reg = registry();
        let mut pipeline = Pipeline::new("p", "");
        let node = pipeline
            .add_node(&reg, "cam", None, HashMap::new())
            .unwrap();
        assert_eq!(node.kind, NodeKind::Source);
        assert!(node.instance.is_none());
    }

    #[test]
    fn add_edge_rejects_wrong_roles() {
        let reg = registry();
        let mut pipeline = Pipeline::new("p", "");
        let cam = pipeline.add_node(&reg, "cam", None, HashMap::new()).unwrap();
        let writer = pipeline
            .add_node(&reg, "writer", None, HashMap::new())
            .unwrap();
        // writer -> cam: writer cannot source, cam cannot sink.
        let err = pipeline.add_edge(&writer.id, &cam.id, None).unwrap_err();
        assert!(matches!(err, Error::InvalidNode { role: "source", .. }));
    }

    #[test]
    fn add_edge_is_idempotent() {
        let reg = registry();
        let mut pipeline = Pipeline::new("p", "");
        let cam = pipeline.add_node(&reg, "cam", None, HashMap::new()).unwrap();
        let filt = pipeline
            .add_node(&reg, "filter", None, HashMap::new())
            .unwrap();
        let first = pipeline.add_edge(&cam.id, &filt.id, None).unwrap();
        let second = pipeline.add_edge(&cam.id, &filt.id, None).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(pipeline.edges.len(), 1);
    }

    #[test]
    fn add_edge_rejects_cycle() {
        let reg = registry();
        let mut pipeline = Pipeline::new("p", "");
        let a = pipeline
            .add_node(&reg, "filter", None, HashMap::new())
            .unwrap();
        let b = pipeline
            .add_node(&reg, "filter", None, HashMap::new())
            .unwrap();
        pipeline.add_edge(&a.id, &b.id, None).unwrap();
        let err = pipeline.add_edge(&b.id, &a.id, None).unwrap_err();
        assert!(matches!(err, Error::NotADag { .. }));
        // The rejected edge must not have been left behind.
        assert_eq!(pipeline.edges.len(), 1);
    }

    #[test]
    fn remove_node_drops_incident_edges() {
        let reg = registry();
        let mut pipeline = Pipeline::new("p", "");
        let cam = pipeline.add_node(&reg, "cam", None, HashMap::new()).unwrap();
        let filt = pipeline
            .add_node(&reg, "filter", None, HashMap::new())
            .unwrap();
        pipeline.add_edge(&cam.id, &filt.id, None).unwrap();
        pipeline.remove_node(&cam.id).unwrap();
        assert!(pipeline.edges.is_empty());
        assert!(pipeline.node(&cam.id).is_err());
    }

    #[test]
    fn instantiate_requires_worker_assignment() {
        let reg = registry();
        let mut pipeline = Pipeline::new("p", "");
        let cam = pipeline.add_node(&reg, "cam", None, HashMap::new()).unwrap();
        assert!(!pipeline.can_instantiate());
        let err = pipeline.instantiate().unwrap_err();
        assert!(matches!(err, Error::InstantiationRefused(_)));
        pipeline.assign_worker(&cam.id, "worker-1").unwrap();
        assert!(pipeline.can_instantiate());
        pipeline.instantiate().unwrap();
        assert!(pipeline.is_instantiated());
        let mapping = pipeline.worker_graph_mapping().unwrap();
        assert_eq!(mapping.get("worker-1").map(Vec::len), Some(1));
    }

    #[test]
    fn instantiate_refuses_when_already_instantiated() {
        let reg = registry();
        let mut pipeline = Pipeline::new("p", "");
        let cam = pipeline.add_node(&reg, "cam", None, HashMap::new()).unwrap();
        pipeline.assign_worker(&cam.id, "worker-1").unwrap();
        pipeline.instantiate().unwrap();
        let err = pipeline.instantiate().unwrap_err();
        assert!(matches!(err, Error::InstantiationRefused(_)));
    }

    #[test]
    fn mutation_is_refused_once_instantiated() {
        let reg = registry();
        let mut pipeline = Pipeline::new("p", "");
        let cam = pipeline.add_node(&reg, "cam", None, HashMap::new()).unwrap();
        pipeline.assign_worker(&cam.id, "worker-1").unwrap();
        pipeline.instantiate().unwrap();
        let err = pipeline
            .add_node(&reg, "filter", None, HashMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::Frozen(_)));
    }

    #[test]
    fn destroy_releases_instances_and_allows_mutation_again() {
        let reg = registry();
        let mut pipeline = Pipeline::new("p", "");
        let cam = pipeline.add_node(&reg, "cam", None, HashMap::new()).unwrap();
        pipeline.assign_worker(&cam.id, "worker-1").unwrap();
        pipeline.instantiate().unwrap();
        pipeline.destroy();
        assert!(!pipeline.is_instantiated());
        pipeline
            .add_node(&reg, "filter", None, HashMap::new())
            .unwrap();
    }

    #[test]
    fn web_json_round_trips_on_uninstantiated_pipeline() {
        let reg = registry();
        let mut pipeline = Pipeline::new("p", "d");
        let cam = pipeline.add_node(&reg, "cam", None, HashMap::new()).unwrap();
        let filt = pipeline
            .add_node(&reg, "filter", None, HashMap::new())
            .unwrap();
        pipeline.add_edge(&cam.id, &filt.id, None).unwrap();

        let projected = pipeline.to_web_json();
        let result = pipeline.update_from_web_json(&projected).unwrap();
        assert_eq!(result.nodes.len(), 2);
        assert_eq!(result.edges.len(), 1);
    }

    #[test]
    fn update_from_web_json_rejects_pipeline_id_mismatch() {
        let mut pipeline = Pipeline::new("p", "");
        let mut projected = pipeline.to_web_json();
        projected.id = "not-the-real-id".to_string();
        let err = pipeline.update_from_web_json(&projected).unwrap_err();
        assert!(matches!(err, Error::PipelineIdMismatch { .. }));
    }

    #[test]
    fn from_config_builds_nodes_and_edges_leaving_workers_unset() {
        use crate::config::PipelineConfig;

        let reg = registry();
        let config = serde_json::from_value::<PipelineConfig>(serde_json::json!({
            "name": "demo",
            "nodes": ["cam", "writer"],
            "adj": [["cam", "writer"]],
        }))
        .unwrap();

        let pipeline = Pipeline::from_config(&config, &reg).unwrap();
        assert_eq!(pipeline.nodes.len(), 2);
        assert_eq!(pipeline.edges.len(), 1);
        assert!(!pipeline.can_instantiate());
    }
}
