//! Error types for the cluster controller and worker runtime adapter

use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the cluster controller
#[derive(Debug, Error)]
pub enum Error {
    /// A pipeline-graph or registry operation failed
    #[error(transparent)]
    Pipeline(#[from] cluster_pipeline::Error),

    /// An FSM transition was rejected
    #[error(transparent)]
    Fsm(#[from] cluster_fsm::Error),

    /// No pipeline is currently active on this controller
    #[error("no active pipeline")]
    NoActivePipeline,

    /// `assign_workers` referenced a worker id the runtime does not know
    #[error("worker `{0}` is not known to the worker runtime")]
    UnknownWorker(String),

    /// The worker runtime adapter call failed
    #[error("worker runtime call failed: {0}")]
    WorkerRuntimeFailure(String),

    /// A worker runtime call did not complete before its deadline
    #[error("worker runtime call `{operation}` timed out after {timeout_secs}s")]
    Timeout {
        /// Name of the operation that timed out.
        operation: &'static str,
        /// The deadline that was exceeded, in seconds.
        timeout_secs: u64,
    },
}
