//! Node template registry
//!
//! Resolves `(package, registry_name)` pairs to constructible node
//! templates. Concrete node execution — the actual SOURCE/STEP/SINK
//! implementations a worker runs — is out of scope; a template here only
//! carries enough metadata to validate edges and to describe the node to
//! the web projection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The three roles a node can play in a pipeline graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    /// Produces data; may only be an edge source.
    Source,
    /// Transforms data; may be either endpoint.
    Step,
    /// Consumes data; may only be an edge sink.
    Sink,
}

impl NodeKind {
    /// Whether a node of this kind may act as an edge's source endpoint.
    pub fn can_be_source(self) -> bool {
        matches!(self, NodeKind::Source | NodeKind::Step)
    }

    /// Whether a node of this kind may act as an edge's sink endpoint.
    pub fn can_be_sink(self) -> bool {
        matches!(self, NodeKind::Sink | NodeKind::Step)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeKind::Source => "SOURCE",
            NodeKind::Step => "STEP",
            NodeKind::Sink => "SINK",
        };
        f.write_str(s)
    }
}

/// A declared constructor parameter and its default value, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDescriptor {
    /// Parameter name.
    pub name: String,
    /// Default value used when a binding omits this parameter.
    #[serde(default)]
    pub default: Option<Value>,
}

/// A registered node template, identified by `(package, registry_name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTemplate {
    /// Name under which the node is registered.
    pub registry_name: String,
    /// The package that owns this registration, if namespaced.
    pub package: Option<String>,
    /// SOURCE, STEP, or SINK — determines edge eligibility.
    pub kind: NodeKind,
    /// Declared constructor parameters and their defaults.
    #[serde(default)]
    pub params: Vec<ParamDescriptor>,
}

impl NodeTemplate {
    /// Construct a template with no declared parameters.
    pub fn new(registry_name: impl Into<String>, package: Option<String>, kind: NodeKind) -> Self {
        Self {
            registry_name: registry_name.into(),
            package,
            kind,
            params: Vec::new(),
        }
    }

    /// Merge caller-supplied parameter bindings over this template's
    /// declared defaults, producing the bindings a [`crate::WrappedNode`]
    /// should carry.
    pub fn bind(&self, overrides: &HashMap<String, Value>) -> HashMap<String, Value> {
        let mut bound: HashMap<String, Value> = self
            .params
            .iter()
            .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
            .collect();
        bound.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        bound
    }
}

fn key(package: Option<&str>, registry_name: &str) -> (String, String) {
    (package.unwrap_or("").to_string(), registry_name.to_string())
}

/// A collection of registered node templates, keyed by `(package,
/// registry_name)`.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    templates: HashMap<(String, String), NodeTemplate>,
}

impl NodeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, replacing any prior registration under the same key.
    pub fn register(&mut self, template: NodeTemplate) {
        let k = key(template.package.as_deref(), &template.registry_name);
        self.templates.insert(k, template);
    }

    /// Look up a template by registry name, optionally namespaced by package.
    pub fn get(&self, registry_name: &str, package: Option<&str>) -> Result<&NodeTemplate> {
        self.templates
            .get(&key(package, registry_name))
            .ok_or_else(|| Error::NodeTemplateUnknown {
                registry_name: registry_name.to_string(),
                package: package.map(str::to_string),
            })
    }

    /// Whether a template is registered under this key.
    pub fn contains(&self, registry_name: &str, package: Option<&str>) -> bool {
        self.templates.contains_key(&key(package, registry_name))
    }

    /// Iterate over all registered templates.
    pub fn iter(&self) -> impl Iterator<Item = &NodeTemplate> {
        self.templates.values()
    }
}
