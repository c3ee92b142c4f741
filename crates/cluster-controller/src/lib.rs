//! The cluster controller: a single-flight FSM-gated state machine around
//! the pipeline graph, the node registry, and an external worker runtime
//! (§4.5).
//!
//! [`ClusterManager`] is the crate's one public surface of consequence; the
//! other modules exist to give it types to compose (`state`, `update`) and a
//! seam to call through (`runtime`, with `mock` as its test double).

mod error;
mod manager;
mod mock;
mod runtime;
mod state;
mod update;

pub use error::{Error, Result};
pub use manager::ClusterManager;
pub use mock::MockWorkerRuntime;
pub use runtime::{InstantiatedGraph, RemoteWorkerRuntime, WorkerGraphMapping, WorkerRuntime};
pub use state::{ClusterState, ManagerState, MethodInfo, NodeState, WorkerState};
pub use update::{PipelineUpdate, StatesInfo};
