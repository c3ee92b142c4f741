//! Error types for the pipeline graph, node registry, and pipelines collection

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or mutating pipelines
#[derive(Debug, Error)]
pub enum Error {
    /// No pipeline with this id exists in the collection
    #[error("pipeline `{0}` does not exist")]
    PipelineNotFound(String),

    /// No node with this id exists in the pipeline
    #[error("node `{0}` does not exist in the pipeline")]
    NodeNotFound(String),

    /// No edge between these endpoints exists in the pipeline
    #[error("edge `{0}` does not exist in the pipeline")]
    EdgeNotFound(String),

    /// An `edge_id` was supplied that does not match the existing edge
    #[error("edge {source} -> {sink} does not have id `{expected}`")]
    EdgeIdMismatch {
        /// Source node id of the mismatched edge
        source: String,
        /// Sink node id of the mismatched edge
        sink: String,
        /// The id the caller expected
        expected: String,
    },

    /// No node template is registered under this `(package, registry_name)`
    #[error("node template `{registry_name}` (package `{package:?}`) is not registered")]
    NodeTemplateUnknown {
        /// The unresolved registry name
        registry_name: String,
        /// The package qualifier, if any
        package: Option<String>,
    },

    /// An edge endpoint has the wrong node kind for its role
    #[error("node `{node_id}` ({kind}) cannot act as {role}: {reason}")]
    InvalidNode {
        /// The offending node's id
        node_id: String,
        /// The offending node's kind
        kind: String,
        /// Whether it was used as a source or sink
        role: &'static str,
        /// Human-readable explanation
        reason: String,
    },

    /// Adding this edge would close a cycle
    #[error("adding edge {source} -> {sink} would create a cycle")]
    NotADag {
        /// Source node id of the rejected edge
        source: String,
        /// Sink node id of the rejected edge
        sink: String,
    },

    /// The pipeline cannot be instantiated in its current state
    #[error("cannot instantiate pipeline: {0}")]
    InstantiationRefused(String),

    /// A web-JSON projection referred to a different pipeline id
    #[error("pipeline id mismatch: expected `{expected}`, found `{found}`")]
    PipelineIdMismatch {
        /// The pipeline's actual id
        expected: String,
        /// The id found in the payload
        found: String,
    },

    /// The operation is not permitted on an instantiated pipeline
    #[error("pipeline is instantiated: {0}")]
    Frozen(String),
}
