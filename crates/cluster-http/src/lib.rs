//! Thin `axum` HTTP/WebSocket surface over the cluster controller (§4.7).
//! Contains no lifecycle logic of its own: every handler validates its
//! path/body shape and calls straight into
//! [`cluster_controller::ClusterManager`].

mod error;
mod handlers;
mod server;
mod ws;

pub use server::{ClusterHttpServer, ServerState};
