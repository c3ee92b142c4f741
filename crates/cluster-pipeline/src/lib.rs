//! Pipeline DAG model, node registry, and the per-controller pipelines
//! collection.
//!
//! A pipeline is a directed acyclic graph of [`node::WrappedNode`]s, each a
//! concrete binding of a [`registry::NodeTemplate`]. Edges are typed by node
//! kind (`SOURCE` may only originate, `SINK` may only terminate, `STEP` may
//! do either) and the graph rejects any edge that would close a cycle.
//! Mutation is only permitted while a pipeline is uninstantiated;
//! [`graph::Pipeline::instantiate`] freezes the graph and hands out opaque
//! instance handles that the worker runtime addresses.

mod collection;
mod config;
mod error;
mod graph;
mod node;
mod registry;

pub use collection::Pipelines;
pub use config::{
    default_timeouts, ManagerConfig, NodeConfig, NodeConfigEntry, PipelineConfig, PipelineMode,
    TimeoutsConfig, WorkerInstanceConfig, WorkersConfig,
};
pub use error::{Error, Result};
pub use graph::{Pipeline, WebPipeline};
pub use node::{InstanceHandle, WebEdge, WebNode, WrappedNode};
pub use registry::{NodeKind, NodeRegistry, NodeTemplate, ParamDescriptor};
