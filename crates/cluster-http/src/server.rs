//! The HTTP/WebSocket server: a thin `axum` router over
//! [`cluster_controller::ClusterManager`], mirroring the teacher's
//! `remotemedia-http::server` module shape.

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use cluster_controller::ClusterManager;

use crate::handlers;
use crate::ws;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ServerState {
    pub manager: Arc<ClusterManager>,
}

/// The cluster controller's HTTP/WebSocket surface.
pub struct ClusterHttpServer {
    bind_address: String,
    state: ServerState,
}

impl ClusterHttpServer {
    /// Build a server around `manager`, to be bound at `bind_address`.
    pub fn new(bind_address: impl Into<String>, manager: Arc<ClusterManager>) -> Self {
        Self {
            bind_address: bind_address.into(),
            state: ServerState { manager },
        }
    }

    fn build_router(&self) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/pipelines", post(handlers::create_pipeline).get(handlers::list_pipelines))
            .route(
                "/pipelines/:id",
                get(handlers::get_pipeline).delete(handlers::remove_pipeline),
            )
            .route("/pipelines/:id/nodes", post(handlers::add_node))
            .route("/pipelines/:id/nodes/:node_id", delete(handlers::remove_node))
            .route(
                "/pipelines/:id/edges",
                post(handlers::add_edge).delete(handlers::remove_edge),
            )
            .route("/pipelines/:id/workers", post(handlers::assign_workers))
            .route("/pipelines/:id/instantiate", post(handlers::instantiate))
            .route("/pipelines/:id/commit", post(handlers::commit))
            .route("/pipelines/:id/preview", post(handlers::preview))
            .route("/pipelines/:id/record", post(handlers::record))
            .route("/pipelines/:id/stop", post(handlers::stop))
            .route("/pipelines/:id/collect", post(handlers::collect))
            .route("/pipelines/:id/reset", post(handlers::reset))
            .route("/ws/network", get(ws::ws_network))
            .route("/ws/pipeline", get(ws::ws_pipeline))
            .with_state(self.state.clone())
            .layer(
                tower::ServiceBuilder::new()
                    .layer(tower_http::trace::TraceLayer::new_for_http())
                    .layer(tower_http::cors::CorsLayer::permissive()),
            )
    }

    /// Bind and serve. Blocks until the listener is closed.
    pub async fn serve(self) -> std::io::Result<()> {
        let router = self.build_router();
        tracing::info!(bind_address = %self.bind_address, "starting cluster HTTP surface");
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        axum::serve(listener, router).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_controller::{ClusterManager, MockWorkerRuntime};
    use cluster_pipeline::NodeRegistry;

    fn manager() -> Arc<ClusterManager> {
        Arc::new(ClusterManager::with_defaults(
            Arc::new(MockWorkerRuntime::new()),
            NodeRegistry::new(),
        ))
    }

    #[test]
    fn router_builds_without_panicking() {
        let server = ClusterHttpServer::new("127.0.0.1:0", manager());
        let _router = server.build_router();
    }
}
