//! `clusterd` binary entry point (§4.8).
//!
//! Loads a pipeline configuration document and FSM declaration (or the
//! built-in default FSM), constructs the controller with a
//! [`cluster_controller::RemoteWorkerRuntime`] pointed at the configured
//! worker-runtime host/port, starts the broadcaster tasks, and serves the
//! HTTP surface.
//!
//! # Usage
//!
//! ```bash
//! # Start against a local worker runtime with the built-in lifecycle FSM
//! clusterd --config ./pipeline.json
//!
//! # Point at a remote worker runtime manager
//! CLUSTERD_WORKER_HOST=10.0.0.5 CLUSTERD_WORKER_PORT=9000 clusterd --config ./pipeline.yaml
//!
//! # With logging
//! RUST_LOG=debug clusterd --config ./pipeline.json
//! ```
//!
//! # Environment Variables
//!
//! - `CLUSTERD_BIND_ADDRESS`: HTTP surface bind address (default: `127.0.0.1:7800`)
//! - `CLUSTERD_WORKER_HOST` / `CLUSTERD_WORKER_PORT`: worker runtime manager address
//! - `RUST_LOG`: logging level (default: `info`)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cluster_config::ServerConfig;
use cluster_controller::{ClusterManager, RemoteWorkerRuntime};
use cluster_fsm::Fsm;
use cluster_http::ClusterHttpServer;
use cluster_pipeline::NodeRegistry;
use tracing::{error, info};

/// Cluster controller daemon: commits a pipeline graph onto a worker
/// runtime and serves its HTTP/WebSocket surface.
#[derive(Parser)]
#[command(name = "clusterd")]
#[command(author, version)]
#[command(about = "Cluster controller daemon")]
struct Args {
    /// Path to a pipeline configuration document (JSON or YAML). If given,
    /// it is loaded and created as the active pipeline at startup.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to an FSM declaration document overriding the built-in lifecycle
    /// FSM.
    #[arg(long)]
    fsm: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let server_config = ServerConfig::from_env();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %server_config.bind_address,
        worker_host = %server_config.worker_host,
        worker_port = server_config.worker_port,
        "clusterd starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("clusterd")
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(run(args, server_config))?;

    info!("clusterd shutdown complete");
    Ok(())
}

async fn run(args: Args, server_config: ServerConfig) -> anyhow::Result<()> {
    let fsm = match &args.fsm {
        Some(path) => {
            let decl = cluster_config::load_fsm_declaration(path)
                .with_context(|| format!("failed to load FSM declaration from {}", path.display()))?;
            Fsm::from_declaration(decl).context("FSM declaration is internally inconsistent")?
        }
        None => Fsm::default_lifecycle(),
    };

    let pipeline_config = match &args.config {
        Some(path) => Some(
            cluster_config::load_pipeline_config(path)
                .with_context(|| format!("failed to load pipeline configuration from {}", path.display()))?,
        ),
        None => None,
    };
    let timeouts = pipeline_config
        .as_ref()
        .map(|c| c.timeouts.clone())
        .unwrap_or_default();

    let worker_runtime = Arc::new(RemoteWorkerRuntime::new(
        server_config.worker_host.clone(),
        server_config.worker_port,
    ));
    let manager = Arc::new(ClusterManager::new(
        worker_runtime,
        NodeRegistry::new(),
        fsm,
        timeouts,
    ));

    if let Some(config) = &pipeline_config {
        let pipeline = manager
            .create_pipeline_from_config(config)
            .await
            .context("failed to create pipeline from configuration")?;
        info!(pipeline_id = %pipeline.id, name = %pipeline.name, "loaded pipeline from configuration");

        let assignments = config.resolve_worker_assignments(&pipeline);
        if !assignments.is_empty() {
            // The worker runtime may not have registered these workers yet
            // at startup; matches the relay connect failure above in not
            // aborting the rest of startup over it.
            match manager.assign_workers(&pipeline.id, assignments).await {
                Ok(()) => info!(pipeline_id = %pipeline.id, "applied worker mappings from configuration"),
                Err(err) => error!(error = %err, "failed to apply worker mappings from configuration"),
            }
        }
    }

    {
        let pipeline_broadcaster = manager.pipeline_broadcaster();
        tokio::spawn(async move { pipeline_broadcaster.run().await });
    }
    {
        let network = manager.network_relay();
        tokio::spawn(async move {
            match network.connect().await {
                Ok(socket) => {
                    tokio::join!(network.run_broadcast(), network.receive_loop(socket));
                }
                Err(err) => {
                    error!(error = %err, "failed to connect to worker runtime push endpoint");
                }
            }
        });
    }

    let server = ClusterHttpServer::new(server_config.bind_address.clone(), manager.clone());
    info!("cluster HTTP surface ready");
    server.serve().await.context("HTTP server error")?;

    manager.shutdown().await;
    Ok(())
}
