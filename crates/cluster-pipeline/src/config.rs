//! Declarative pipeline configuration document (§6 of the specification)

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::WebPipeline;

/// Default timeouts, in seconds, applied when a [`TimeoutsConfig`] omits a
/// field.
pub mod default_timeouts {
    /// `commit` deadline.
    pub const COMMIT: u64 = 60;
    /// `preview` deadline.
    pub const PREVIEW: u64 = 20;
    /// `record` deadline.
    pub const RECORD: u64 = 20;
    /// `collect` deadline.
    pub const COLLECT: u64 = 20;
    /// `stop` deadline.
    pub const STOP: u64 = 20;
    /// `shutdown` deadline.
    pub const SHUTDOWN: u64 = 20;
}

/// A single node entry in a [`PipelineConfig`], or the bare-string shorthand
/// for `{registry_name: s, name: s}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeConfigEntry {
    /// `{registry_name, name, kwargs, package}` form.
    Full(NodeConfig),
    /// Bare string shorthand: both `registry_name` and `name` equal the string.
    Shorthand(String),
}

impl NodeConfigEntry {
    /// Normalize into the full [`NodeConfig`] shape.
    pub fn into_full(self) -> NodeConfig {
        match self {
            NodeConfigEntry::Full(n) => n,
            NodeConfigEntry::Shorthand(s) => NodeConfig {
                registry_name: s.clone(),
                name: s,
                kwargs: HashMap::new(),
                package: None,
            },
        }
    }
}

/// A node entry within a pipeline configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name of the registered template to instantiate from.
    pub registry_name: String,
    /// Name assigned to the resulting node.
    pub name: String,
    /// Bound constructor parameters.
    #[serde(default)]
    pub kwargs: HashMap<String, Value>,
    /// Package qualifier of the template, if any.
    #[serde(default)]
    pub package: Option<String>,
}

/// Execution mode requested for the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// Run without recording.
    Preview,
    /// Run and record.
    Record,
}

/// `manager_config` section of a pipeline configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Directory the worker runtime writes logs to.
    pub logdir: String,
    /// Port the worker runtime's manager listens on.
    pub port: u16,
    /// Whether to advertise the manager via zeroconf.
    #[serde(default)]
    pub zeroconf: bool,
}

/// A single worker instance declared under `workers.instances`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInstanceConfig {
    /// Human-readable name of the worker.
    pub name: String,
    /// Worker id as known to the worker runtime.
    pub id: String,
    /// Whether this worker runs on a remote host.
    #[serde(default)]
    pub remote: bool,
    /// Optional free-text description.
    #[serde(default)]
    pub description: Option<String>,
}

/// `workers` section of a pipeline configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// IP address of the worker runtime's manager.
    pub manager_ip: String,
    /// Port of the worker runtime's manager.
    pub manager_port: u16,
    /// Declared worker instances.
    #[serde(default)]
    pub instances: Vec<WorkerInstanceConfig>,
}

/// `timeouts` section of a pipeline configuration document, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// `commit` deadline, defaults to [`default_timeouts::COMMIT`].
    #[serde(default = "default_timeouts_commit")]
    pub commit_timeout: u64,
    /// `preview` deadline, defaults to [`default_timeouts::PREVIEW`].
    #[serde(default = "default_timeouts_preview")]
    pub preview_timeout: u64,
    /// `record` deadline, defaults to [`default_timeouts::RECORD`].
    #[serde(default = "default_timeouts_record")]
    pub record_timeout: u64,
    /// `collect` deadline, defaults to [`default_timeouts::COLLECT`].
    #[serde(default = "default_timeouts_collect")]
    pub collect_timeout: u64,
    /// `stop` deadline, defaults to [`default_timeouts::STOP`].
    #[serde(default = "default_timeouts_stop")]
    pub stop_timeout: u64,
    /// `shutdown` deadline, defaults to [`default_timeouts::SHUTDOWN`].
    #[serde(default = "default_timeouts_shutdown")]
    pub shutdown_timeout: u64,
}

fn default_timeouts_commit() -> u64 {
    default_timeouts::COMMIT
}
fn default_timeouts_preview() -> u64 {
    default_timeouts::PREVIEW
}
fn default_timeouts_record() -> u64 {
    default_timeouts::RECORD
}
fn default_timeouts_collect() -> u64 {
    default_timeouts::COLLECT
}
fn default_timeouts_stop() -> u64 {
    default_timeouts::STOP
}
fn default_timeouts_shutdown() -> u64 {
    default_timeouts::SHUTDOWN
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            commit_timeout: default_timeouts::COMMIT,
            preview_timeout: default_timeouts::PREVIEW,
            record_timeout: default_timeouts::RECORD,
            collect_timeout: default_timeouts::COLLECT,
            stop_timeout: default_timeouts::STOP,
            shutdown_timeout: default_timeouts::SHUTDOWN,
        }
    }
}

/// The full pipeline configuration document consumed by
/// `Pipeline::from_config` / `Pipelines::create_from_config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name.
    pub name: String,
    /// Pipeline description.
    #[serde(default)]
    pub description: String,
    /// Requested execution mode.
    #[serde(default = "default_mode")]
    pub mode: PipelineMode,
    /// Optional bounded runtime, in seconds.
    #[serde(default)]
    pub runtime: Option<u64>,
    /// Worker-runtime manager configuration.
    #[serde(default)]
    pub manager_config: Option<ManagerConfig>,
    /// Declared worker instances.
    #[serde(default)]
    pub workers: Option<WorkersConfig>,
    /// Node declarations, in the bare-string or full shape.
    #[serde(default)]
    pub nodes: Vec<NodeConfigEntry>,
    /// `[source_name, sink_name]` adjacency pairs, by node name.
    #[serde(default)]
    pub adj: Vec<(String, String)>,
    /// `worker_name_or_id -> [node_name, ...]` assignment, applied after
    /// node/edge construction.
    #[serde(default)]
    pub mappings: HashMap<String, Vec<String>>,
    /// Per-operation deadlines.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Whether to keep remote workers alive across a reset.
    #[serde(default)]
    pub keep_remote_workers: bool,
}

fn default_mode() -> PipelineMode {
    PipelineMode::Preview
}

impl PipelineConfig {
    /// Resolve `mappings` (`worker_name_or_id -> [node_name, ...]`) against
    /// `pipeline`'s web-JSON projection into the `node_id -> worker_id`
    /// shape [`cluster_controller::ClusterManager::assign_workers`] (not a
    /// dependency of this crate, but the caller this method exists for)
    /// expects.
    ///
    /// A mapping key is looked up first against `workers.instances` by
    /// name, falling back to treating the key itself as the worker id (the
    /// document may name workers either way). A node name with no match in
    /// `pipeline.nodes` is silently skipped — worker assignment is applied
    /// best-effort, after node/edge construction already succeeded.
    pub fn resolve_worker_assignments(&self, pipeline: &WebPipeline) -> HashMap<String, String> {
        let node_id_by_name: HashMap<&str, &str> = pipeline
            .nodes
            .iter()
            .filter_map(|n| n.id.as_deref().map(|id| (n.name.as_str(), id)))
            .collect();

        let worker_id_by_name: HashMap<&str, &str> = self
            .workers
            .as_ref()
            .map(|w| {
                w.instances
                    .iter()
                    .map(|i| (i.name.as_str(), i.id.as_str()))
                    .collect()
            })
            .unwrap_or_default();

        let mut assignments = HashMap::new();
        for (worker_key, node_names) in &self.mappings {
            let worker_id = worker_id_by_name
                .get(worker_key.as_str())
                .copied()
                .unwrap_or(worker_key.as_str());
            for node_name in node_names {
                if let Some(node_id) = node_id_by_name.get(node_name.as_str()) {
                    assignments.insert((*node_id).to_string(), worker_id.to_string());
                }
            }
        }
        assignments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::WebNode;

    fn web_node(id: &str, name: &str) -> WebNode {
        WebNode {
            id: Some(id.to_string()),
            name: name.to_string(),
            registry_name: name.to_string(),
            package: None,
            kind: None,
            params: HashMap::new(),
            worker_id: None,
        }
    }

    #[test]
    fn resolve_worker_assignments_maps_names_through_worker_instances() {
        let config: PipelineConfig = serde_json::from_value(serde_json::json!({
            "name": "demo",
            "workers": {
                "manager_ip": "127.0.0.1",
                "manager_port": 7801,
                "instances": [{"name": "edge-1", "id": "worker-abc"}],
            },
            "mappings": { "edge-1": ["cam", "writer"] },
        }))
        .unwrap();

        let pipeline = WebPipeline {
            id: "p".into(),
            name: "demo".into(),
            description: String::new(),
            instantiated: false,
            committed: false,
            nodes: vec![web_node("n1", "cam"), web_node("n2", "writer")],
            edges: vec![],
        };

        let assignments = config.resolve_worker_assignments(&pipeline);
        assert_eq!(assignments.get("n1").map(String::as_str), Some("worker-abc"));
        assert_eq!(assignments.get("n2").map(String::as_str), Some("worker-abc"));
    }

    #[test]
    fn resolve_worker_assignments_falls_back_to_key_as_worker_id() {
        let config: PipelineConfig = serde_json::from_value(serde_json::json!({
            "name": "demo",
            "mappings": { "worker-xyz": ["cam"] },
        }))
        .unwrap();

        let pipeline = WebPipeline {
            id: "p".into(),
            name: "demo".into(),
            description: String::new(),
            instantiated: false,
            committed: false,
            nodes: vec![web_node("n1", "cam")],
            edges: vec![],
        };

        let assignments = config.resolve_worker_assignments(&pipeline);
        assert_eq!(assignments.get("n1").map(String::as_str), Some("worker-xyz"));
    }

    #[test]
    fn resolve_worker_assignments_skips_unknown_node_names() {
        let config: PipelineConfig = serde_json::from_value(serde_json::json!({
            "name": "demo",
            "mappings": { "worker-xyz": ["ghost"] },
        }))
        .unwrap();

        let pipeline = WebPipeline {
            id: "p".into(),
            name: "demo".into(),
            description: String::new(),
            instantiated: false,
            committed: false,
            nodes: vec![],
            edges: vec![],
        };

        assert!(config.resolve_worker_assignments(&pipeline).is_empty());
    }
}
