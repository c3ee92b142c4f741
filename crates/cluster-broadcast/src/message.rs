//! Wire shapes published by the upstream relay broadcaster.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw signal frame as received from the worker runtime's push endpoint,
/// before classification.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawFrame {
    pub signal: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Signal names recognized on the upstream push endpoint.
pub(crate) mod upstream_signal {
    pub const NETWORK_STATUS_UPDATE: &str = "NETWORK_STATUS_UPDATE";
    pub const NODE_STATUS_UPDATE: &str = "NODE_STATUS_UPDATE";
    pub const SHUTDOWN: &str = "SHUTDOWN";
}

/// A classified update, published to subscribers of the network broadcaster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "signal")]
pub enum UpdateMessage {
    /// A network or node status change, carrying the raw state payload and
    /// whether zeroconf discovery is currently enabled.
    #[serde(rename = "NETWORK_UPDATE")]
    NetworkUpdate {
        /// Raw state payload from the worker runtime, if present.
        data: Option<Value>,
        /// Whether zeroconf discovery was enabled at publish time.
        zeroconf_discovery: bool,
    },
    /// The worker runtime is shutting down.
    #[serde(rename = "SHUTDOWN")]
    Shutdown,
    /// The upstream connection was lost.
    #[serde(rename = "ERROR")]
    Error {
        /// Human-readable description of the failure.
        message: String,
    },
}

/// Build the `CLIENT_REGISTER` frame sent immediately after connecting.
pub(crate) fn client_register_frame(client_id: &str) -> Value {
    serde_json::json!({
        "signal": "CLIENT_REGISTER",
        "data": { "client_id": client_id },
        "ok": true,
        "uuid": uuid::Uuid::new_v4().to_string(),
    })
}
