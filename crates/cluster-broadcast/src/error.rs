//! Error types for the broadcaster and upstream relay

use thiserror::Error;

/// Result type alias for broadcaster operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while relaying worker-runtime updates
#[derive(Debug, Error)]
pub enum Error {
    /// Could not open the upstream WebSocket connection
    #[error("failed to connect to upstream relay at {host}:{port}: {source}")]
    Connect {
        /// Upstream host
        host: String,
        /// Upstream port
        port: u16,
        /// The underlying WebSocket error
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// Could not send the `CLIENT_REGISTER` registration frame
    #[error("failed to send registration frame: {0}")]
    Register(#[source] tokio_tungstenite::tungstenite::Error),

    /// The upstream connection closed abnormally
    #[error("upstream connection lost: {0}")]
    UpstreamDisconnected(String),
}
