//! The worker runtime adapter: the seam the controller programs against
//! instead of talking to the external worker layer directly (§4.6, §6).

use std::collections::HashMap;

use async_trait::async_trait;
use cluster_pipeline::WebPipeline;

use crate::error::{Error, Result};
use crate::state::ManagerState;

/// `worker_id -> [instance_id, ...]`, as produced by
/// [`cluster_pipeline::Pipeline::worker_graph_mapping`].
pub type WorkerGraphMapping = HashMap<String, Vec<String>>;

/// The committed graph shape handed to [`WorkerRuntime::async_commit`]: the
/// instantiated pipeline's web-JSON projection, carrying every node's bound
/// parameters and worker assignment.
pub type InstantiatedGraph = WebPipeline;

/// Thin async interface the controller uses to talk to the external worker
/// runtime (§1 "out of scope", §6). Concrete node execution, log/recording
/// persistence, and worker process management all live on the other side of
/// this trait.
#[async_trait]
pub trait WorkerRuntime: Send + Sync {
    /// Host the worker runtime's manager listens on.
    fn host(&self) -> &str;

    /// Port the worker runtime's manager listens on.
    fn port(&self) -> u16;

    /// A snapshot of the worker runtime's current state.
    async fn state(&self) -> Result<ManagerState>;

    /// Commit an instantiated graph and its worker mapping to the runtime.
    async fn async_commit(
        &self,
        graph: &InstantiatedGraph,
        mapping: &WorkerGraphMapping,
    ) -> Result<()>;

    /// Start previewing the committed graph.
    async fn async_start(&self) -> Result<()>;

    /// Begin recording.
    async fn async_record(&self) -> Result<()>;

    /// Stop the running pipeline.
    async fn async_stop(&self) -> Result<()>;

    /// Collect recorded results from the workers.
    async fn async_collect(&self) -> Result<()>;

    /// Clear any committed graph. `keep_workers` requests that worker
    /// processes themselves stay alive, only the graph being torn down.
    async fn async_reset(&self, keep_workers: bool) -> Result<()>;

    /// Shut the worker runtime down entirely.
    async fn async_shutdown(&self) -> Result<()>;

    /// Enable or disable zeroconf advertisement of the manager.
    async fn zeroconf(&self, enable: bool) -> Result<()>;
}

/// A [`WorkerRuntime`] that talks to a real worker-runtime process over
/// HTTP, grounded in the teacher's HTTP transport client/server split
/// (`transports/http::server`): each lifecycle call is a `POST` to the
/// manager's REST surface, and [`WorkerRuntime::state`] is a `GET`.
pub struct RemoteWorkerRuntime {
    host: String,
    port: u16,
    client: reqwest::Client,
}

impl RemoteWorkerRuntime {
    /// Point a new adapter at `host:port`'s worker-runtime manager.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.port, path)
    }

    async fn post_empty(&self, path: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(path))
            .send()
            .await
            .map_err(|e| Error::WorkerRuntimeFailure(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::WorkerRuntimeFailure(format!(
                "{path} returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkerRuntime for RemoteWorkerRuntime {
    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    async fn state(&self) -> Result<ManagerState> {
        let response = self
            .client
            .get(self.url("/state"))
            .send()
            .await
            .map_err(|e| Error::WorkerRuntimeFailure(e.to_string()))?;
        response
            .json::<ManagerState>()
            .await
            .map_err(|e| Error::WorkerRuntimeFailure(e.to_string()))
    }

    async fn async_commit(
        &self,
        graph: &InstantiatedGraph,
        mapping: &WorkerGraphMapping,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.url("/commit"))
            .json(&serde_json::json!({ "graph": graph, "mapping": mapping }))
            .send()
            .await
            .map_err(|e| Error::WorkerRuntimeFailure(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::WorkerRuntimeFailure(format!(
                "/commit returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn async_start(&self) -> Result<()> {
        self.post_empty("/start").await
    }

    async fn async_record(&self) -> Result<()> {
        self.post_empty("/record").await
    }

    async fn async_stop(&self) -> Result<()> {
        self.post_empty("/stop").await
    }

    async fn async_collect(&self) -> Result<()> {
        self.post_empty("/collect").await
    }

    async fn async_reset(&self, keep_workers: bool) -> Result<()> {
        let response = self
            .client
            .post(self.url("/reset"))
            .json(&serde_json::json!({ "keep_workers": keep_workers }))
            .send()
            .await
            .map_err(|e| Error::WorkerRuntimeFailure(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::WorkerRuntimeFailure(format!(
                "/reset returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn async_shutdown(&self) -> Result<()> {
        self.post_empty("/shutdown").await
    }

    async fn zeroconf(&self, enable: bool) -> Result<()> {
        let response = self
            .client
            .post(self.url("/zeroconf"))
            .json(&serde_json::json!({ "enable": enable }))
            .send()
            .await
            .map_err(|e| Error::WorkerRuntimeFailure(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::WorkerRuntimeFailure(format!(
                "/zeroconf returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
