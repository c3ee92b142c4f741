//! The cluster controller (§4.5): composes the FSM, the pipelines
//! collection, both broadcasters, and a [`WorkerRuntime`] handle behind the
//! single-flight lifecycle discipline described in §5.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cluster_broadcast::{Broadcaster, Envelope, SubscriberId, UpdateMessage, UpstreamRelay};
use cluster_fsm::Fsm;
use cluster_pipeline::{
    NodeRegistry, NodeTemplate, Pipeline, PipelineConfig, Pipelines, TimeoutsConfig, WebEdge,
    WebPipeline, WrappedNode,
};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex, RwLock as AsyncRwLock};

use crate::error::{Error, Result};
use crate::runtime::WorkerRuntime;
use crate::state::ClusterState;
use crate::update::{PipelineUpdate, StatesInfo};

/// Owns one cluster's worth of lifecycle state: the FSM, the pipelines
/// collection, the node registry, the active-pipeline pointer, both
/// broadcasters, and the worker runtime handle.
///
/// Lock ordering, where more than one is taken: `registry` before
/// `pipelines` before `active_pipeline` before `fsm`. Every public method
/// that needs more than one lock follows this order to avoid deadlock.
pub struct ClusterManager {
    fsm: AsyncMutex<Fsm>,
    pipelines: AsyncRwLock<Pipelines>,
    registry: AsyncRwLock<NodeRegistry>,
    active_pipeline: AsyncRwLock<Option<String>>,
    worker_runtime: Arc<dyn WorkerRuntime>,
    network: Arc<UpstreamRelay>,
    pipeline_broadcaster: Arc<Broadcaster<PipelineUpdate>>,
    timeouts: TimeoutsConfig,
}

impl ClusterManager {
    /// Construct a controller around `worker_runtime`, seeded with an empty
    /// pipelines collection and `registry`'s initial templates.
    pub fn new(
        worker_runtime: Arc<dyn WorkerRuntime>,
        registry: NodeRegistry,
        fsm: Fsm,
        timeouts: TimeoutsConfig,
    ) -> Self {
        let network = Arc::new(UpstreamRelay::new(
            worker_runtime.host().to_string(),
            worker_runtime.port(),
        ));
        Self {
            fsm: AsyncMutex::new(fsm),
            pipelines: AsyncRwLock::new(Pipelines::new()),
            registry: AsyncRwLock::new(registry),
            active_pipeline: AsyncRwLock::new(None),
            worker_runtime,
            network,
            pipeline_broadcaster: Arc::new(Broadcaster::new()),
            timeouts,
        }
    }

    /// Construct a controller using the built-in lifecycle FSM and default
    /// timeouts, the configuration a `clusterd` binary reaches for unless
    /// an operator supplies an override.
    pub fn with_defaults(worker_runtime: Arc<dyn WorkerRuntime>, registry: NodeRegistry) -> Self {
        Self::new(
            worker_runtime,
            registry,
            Fsm::default_lifecycle(),
            TimeoutsConfig::default(),
        )
    }

    /// The upstream relay broadcaster, for callers that need to drive its
    /// `connect`/`receive_loop`/`run_broadcast` tasks (the controller itself
    /// only publishes to and reads the zeroconf flag on it).
    pub fn network_relay(&self) -> Arc<UpstreamRelay> {
        self.network.clone()
    }

    /// The pipeline-update broadcaster, for callers that need to drive its
    /// `run` loop.
    pub fn pipeline_broadcaster(&self) -> Arc<Broadcaster<PipelineUpdate>> {
        self.pipeline_broadcaster.clone()
    }

    // ---- pipeline CRUD -------------------------------------------------

    /// Register a node template usable by subsequently created pipelines.
    pub async fn register_node_template(&self, template: NodeTemplate) {
        self.registry.write().await.register(template);
    }

    /// Create an empty pipeline.
    pub async fn create_pipeline(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> WebPipeline {
        self.pipelines.write().await.create(name, description).to_web_json()
    }

    /// Create a pipeline from a declarative configuration document.
    pub async fn create_pipeline_from_config(&self, config: &PipelineConfig) -> Result<WebPipeline> {
        let registry = self.registry.read().await;
        let mut pipelines = self.pipelines.write().await;
        Ok(pipelines.create_from_config(config, &registry)?.to_web_json())
    }

    /// Fetch a pipeline's web-JSON projection.
    pub async fn get_pipeline(&self, pipeline_id: &str) -> Result<WebPipeline> {
        Ok(self.pipelines.read().await.get(pipeline_id)?.to_web_json())
    }

    /// Every registered pipeline's web-JSON projection.
    pub async fn list_pipelines(&self) -> Vec<WebPipeline> {
        self.pipelines.read().await.list_web_json()
    }

    /// Remove a pipeline, clearing the active pointer first if it names the
    /// pipeline being removed.
    pub async fn remove_pipeline(&self, pipeline_id: &str) -> Result<WebPipeline> {
        let mut active = self.active_pipeline.write().await;
        if active.as_deref() == Some(pipeline_id) {
            *active = None;
        }
        drop(active);
        Ok(self.pipelines.write().await.remove(pipeline_id)?.to_web_json())
    }

    /// Add a node to a pipeline.
    pub async fn add_node(
        &self,
        pipeline_id: &str,
        registry_name: &str,
        package: Option<&str>,
        params: HashMap<String, Value>,
    ) -> Result<WrappedNode> {
        let registry = self.registry.read().await;
        let mut pipelines = self.pipelines.write().await;
        let pipeline = pipelines.get_mut(pipeline_id)?;
        Ok(pipeline.add_node(&registry, registry_name, package, params)?)
    }

    /// Remove a node (and its incident edges) from a pipeline.
    pub async fn remove_node(&self, pipeline_id: &str, node_id: &str) -> Result<WrappedNode> {
        let mut pipelines = self.pipelines.write().await;
        Ok(pipelines.get_mut(pipeline_id)?.remove_node(node_id)?)
    }

    /// Connect two nodes in a pipeline.
    pub async fn add_edge(
        &self,
        pipeline_id: &str,
        source_id: &str,
        sink_id: &str,
        edge_id: Option<String>,
    ) -> Result<WebEdge> {
        let mut pipelines = self.pipelines.write().await;
        Ok(pipelines.get_mut(pipeline_id)?.add_edge(source_id, sink_id, edge_id)?)
    }

    /// Disconnect two nodes in a pipeline.
    pub async fn remove_edge(
        &self,
        pipeline_id: &str,
        source_id: &str,
        sink_id: &str,
        edge_id: Option<&str>,
    ) -> Result<WebEdge> {
        let mut pipelines = self.pipelines.write().await;
        Ok(pipelines.get_mut(pipeline_id)?.remove_edge(source_id, sink_id, edge_id)?)
    }

    /// Apply a web-JSON projection's mutable fields back onto the pipeline
    /// it names.
    pub async fn update_pipeline(&self, web: &WebPipeline) -> Result<WebPipeline> {
        let mut pipelines = self.pipelines.write().await;
        Ok(pipelines.get_mut(&web.id)?.update_from_web_json(web)?)
    }

    /// Assign workers to nodes, atomically: every node must exist and every
    /// worker id must be known to the worker runtime's current state, or
    /// none of the assignments are applied.
    pub async fn assign_workers(
        &self,
        pipeline_id: &str,
        assignments: HashMap<String, String>,
    ) -> Result<()> {
        if self.fsm.lock().await.is_transitioning() {
            return Err(Error::Fsm(cluster_fsm::Error::AlreadyTransitioning));
        }
        let state = self.worker_runtime.state().await?;
        for worker_id in assignments.values() {
            if !state.workers.contains_key(worker_id) {
                return Err(Error::UnknownWorker(worker_id.clone()));
            }
        }
        let mut pipelines = self.pipelines.write().await;
        let pipeline = pipelines.get_mut(pipeline_id)?;
        for node_id in assignments.keys() {
            pipeline.node(node_id)?;
        }
        for (node_id, worker_id) in &assignments {
            pipeline.assign_worker(node_id, worker_id.clone())?;
        }
        Ok(())
    }

    // ---- lifecycle -------------------------------------------------------

    async fn begin(&self, op: &str) -> Result<()> {
        self.fsm.lock().await.begin_transition(op).map_err(Error::Fsm)
    }

    async fn finish(&self, op: &str, ok: bool) {
        let mut fsm = self.fsm.lock().await;
        if ok {
            let _ = fsm.complete_transition(op);
        } else {
            fsm.abort_transition();
        }
    }

    async fn require_active(&self) -> Result<String> {
        self.active_pipeline
            .read()
            .await
            .clone()
            .ok_or(Error::NoActivePipeline)
    }

    async fn call_runtime<Fut>(&self, operation: &'static str, timeout_secs: u64, fut: Fut) -> Result<()>
    where
        Fut: std::future::Future<Output = Result<()>>,
    {
        match tokio::time::timeout(Duration::from_secs(timeout_secs), fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout { operation, timeout_secs }),
        }
    }

    async fn publish_pipeline_update(&self, error: Option<String>) {
        let fsm = self.fsm.lock().await.snapshot();
        let active_id = self.active_pipeline.read().await.clone();
        let pipeline = match &active_id {
            Some(id) => self.pipelines.read().await.get(id).ok().map(Pipeline::to_web_json),
            None => None,
        };
        self.pipeline_broadcaster.publish(PipelineUpdate { fsm, pipeline, error });
    }

    /// Materialize the named pipeline's graph and mark it the active
    /// pipeline. Fails `PipelineNotFound` if the pipeline doesn't exist, or
    /// propagates [`cluster_pipeline::Error::InstantiationRefused`] if it
    /// can't yet be instantiated (e.g. a node lacks a worker assignment).
    pub async fn instantiate(&self, pipeline_id: &str) -> Result<()> {
        self.begin("/instantiate").await?;
        let result = self.do_instantiate(pipeline_id).await;
        self.finish("/instantiate", result.is_ok()).await;
        self.publish_pipeline_update(result.as_ref().err().map(ToString::to_string)).await;
        result
    }

    async fn do_instantiate(&self, pipeline_id: &str) -> Result<()> {
        {
            let pipelines = self.pipelines.read().await;
            pipelines.get(pipeline_id)?;
        }
        *self.active_pipeline.write().await = Some(pipeline_id.to_string());
        let mut pipelines = self.pipelines.write().await;
        let pipeline = pipelines.get_mut(pipeline_id)?;
        pipeline.instantiate()?;
        Ok(())
    }

    /// Clear any previously committed graph, then commit the active
    /// pipeline's graph and worker mapping to the worker runtime.
    pub async fn commit(&self) -> Result<()> {
        self.begin("/commit").await?;
        let result = self.do_commit().await;
        self.finish("/commit", result.is_ok()).await;
        self.publish_pipeline_update(result.as_ref().err().map(ToString::to_string)).await;
        result
    }

    async fn do_commit(&self) -> Result<()> {
        let pipeline_id = self.require_active().await?;
        self.call_runtime(
            "async_reset",
            self.timeouts.commit_timeout,
            self.worker_runtime.async_reset(true),
        )
        .await?;
        let (graph, mapping) = {
            let pipelines = self.pipelines.read().await;
            let pipeline = pipelines.get(&pipeline_id)?;
            (pipeline.to_web_json(), pipeline.worker_graph_mapping()?)
        };
        self.call_runtime(
            "async_commit",
            self.timeouts.commit_timeout,
            self.worker_runtime.async_commit(&graph, &mapping),
        )
        .await?;
        let mut pipelines = self.pipelines.write().await;
        pipelines.get_mut(&pipeline_id)?.set_committed(true)?;
        Ok(())
    }

    /// Start the active pipeline running without recording.
    pub async fn preview(&self) -> Result<()> {
        self.begin("/preview").await?;
        let result = self.do_preview().await;
        self.finish("/preview", result.is_ok()).await;
        self.publish_pipeline_update(result.as_ref().err().map(ToString::to_string)).await;
        result
    }

    async fn do_preview(&self) -> Result<()> {
        self.require_active().await?;
        self.call_runtime(
            "async_start",
            self.timeouts.preview_timeout,
            self.worker_runtime.async_start(),
        )
        .await
    }

    /// Begin recording the running pipeline.
    pub async fn record(&self) -> Result<()> {
        self.begin("/record").await?;
        let result = self.do_record().await;
        self.finish("/record", result.is_ok()).await;
        self.publish_pipeline_update(result.as_ref().err().map(ToString::to_string)).await;
        result
    }

    async fn do_record(&self) -> Result<()> {
        self.require_active().await?;
        self.call_runtime(
            "async_record",
            self.timeouts.record_timeout,
            self.worker_runtime.async_record(),
        )
        .await
    }

    /// Stop the running pipeline.
    pub async fn stop(&self) -> Result<()> {
        self.begin("/stop").await?;
        let result = self.do_stop().await;
        self.finish("/stop", result.is_ok()).await;
        self.publish_pipeline_update(result.as_ref().err().map(ToString::to_string)).await;
        result
    }

    async fn do_stop(&self) -> Result<()> {
        self.require_active().await?;
        self.call_runtime(
            "async_stop",
            self.timeouts.stop_timeout,
            self.worker_runtime.async_stop(),
        )
        .await
    }

    /// Collect recorded results from the workers.
    pub async fn collect(&self) -> Result<()> {
        self.begin("/collect").await?;
        let result = self.do_collect().await;
        self.finish("/collect", result.is_ok()).await;
        self.publish_pipeline_update(result.as_ref().err().map(ToString::to_string)).await;
        result
    }

    async fn do_collect(&self) -> Result<()> {
        self.require_active().await?;
        self.call_runtime(
            "async_collect",
            self.timeouts.collect_timeout,
            self.worker_runtime.async_collect(),
        )
        .await
    }

    /// Tear the active pipeline's graph down and release it, returning the
    /// controller to `INITIALIZED`.
    pub async fn reset(&self) -> Result<()> {
        self.begin("/reset").await?;
        let result = self.do_reset().await;
        self.finish("/reset", result.is_ok()).await;
        self.publish_pipeline_update(result.as_ref().err().map(ToString::to_string)).await;
        result
    }

    async fn do_reset(&self) -> Result<()> {
        let pipeline_id = self.require_active().await?;
        self.call_runtime(
            "async_reset",
            self.timeouts.stop_timeout,
            self.worker_runtime.async_reset(true),
        )
        .await?;
        let mut pipelines = self.pipelines.write().await;
        pipelines.get_mut(&pipeline_id)?.destroy();
        drop(pipelines);
        *self.active_pipeline.write().await = None;
        Ok(())
    }

    // ---- zeroconf ----------------------------------------------------

    /// Enable zeroconf advertisement, propagating the flag through the
    /// relay and publishing a refreshed `ClusterState`.
    pub async fn enable_zeroconf_discovery(&self) -> Result<()> {
        self.worker_runtime.zeroconf(true).await?;
        self.network.set_zeroconf_enabled(true);
        self.publish_network_update().await;
        Ok(())
    }

    /// Disable zeroconf advertisement, propagating the flag through the
    /// relay and publishing a refreshed `ClusterState`.
    pub async fn disable_zeroconf_discovery(&self) -> Result<()> {
        self.worker_runtime.zeroconf(false).await?;
        self.network.set_zeroconf_enabled(false);
        self.publish_network_update().await;
        Ok(())
    }

    async fn publish_network_update(&self) {
        match self.worker_runtime.state().await {
            Ok(state) => {
                let zeroconf = self.network.zeroconf_enabled();
                let cluster_state = ClusterState::from_manager_state(state, zeroconf);
                self.network.publish(UpdateMessage::NetworkUpdate {
                    data: serde_json::to_value(&cluster_state).ok(),
                    zeroconf_discovery: zeroconf,
                });
            }
            Err(err) => tracing::warn!(error = %err, "failed to fetch worker runtime state"),
        }
    }

    // ---- subscriptions -------------------------------------------------

    /// Subscribe to network/node status updates.
    pub async fn subscribe_network(
        &self,
    ) -> (SubscriberId, mpsc::UnboundedReceiver<Envelope<UpdateMessage>>) {
        self.network.subscribe().await
    }

    /// Deregister a network-update subscriber.
    pub async fn unsubscribe_network(&self, id: SubscriberId) {
        self.network.unsubscribe(id).await;
    }

    /// Subscribe to pipeline-lifecycle updates. The first message the new
    /// subscriber observes is always a replay of the current `{fsm,
    /// pipeline}` snapshot, priming it before any further broadcast.
    pub async fn subscribe_pipeline(
        &self,
    ) -> (SubscriberId, mpsc::UnboundedReceiver<Envelope<PipelineUpdate>>) {
        let (id, rx) = self.pipeline_broadcaster.subscribe().await;
        let info = self.get_states_info().await;
        let pipeline = match &info.active_pipeline_id {
            Some(pid) => self.pipelines.read().await.get(pid).ok().map(Pipeline::to_web_json),
            None => None,
        };
        self.pipeline_broadcaster
            .send_to(
                id,
                PipelineUpdate { fsm: info.fsm, pipeline, error: None },
            )
            .await;
        (id, rx)
    }

    /// Deregister a pipeline-update subscriber.
    pub async fn unsubscribe_pipeline(&self, id: SubscriberId) {
        self.pipeline_broadcaster.unsubscribe(id).await;
    }

    /// The FSM snapshot augmented with the active pipeline id.
    pub async fn get_states_info(&self) -> StatesInfo {
        let fsm = self.fsm.lock().await.snapshot();
        let active_pipeline_id = self.active_pipeline.read().await.clone();
        StatesInfo { fsm, active_pipeline_id }
    }

    /// Enqueue sentinels on both broadcasters, then shut the worker runtime
    /// down. Each step is attempted even if an earlier one fails.
    pub async fn shutdown(&self) {
        self.pipeline_broadcaster.enqueue_sentinel();
        self.network.enqueue_sentinel();
        if let Err(err) = self
            .call_runtime(
                "async_shutdown",
                self.timeouts.shutdown_timeout,
                self.worker_runtime.async_shutdown(),
            )
            .await
        {
            tracing::error!(error = %err, "worker runtime shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWorkerRuntime;
    use cluster_pipeline::{NodeKind, NodeTemplate};

    fn registry() -> NodeRegistry {
        let mut r = NodeRegistry::new();
        r.register(NodeTemplate::new("cam", None, NodeKind::Source));
        r.register(NodeTemplate::new("writer", None, NodeKind::Sink));
        r
    }

    async fn manager_with_active_pipeline() -> (ClusterManager, String) {
        let mock = Arc::new(MockWorkerRuntime::new());
        let mut state = crate::state::ManagerState::default();
        state.workers.insert("worker-1".into(), Default::default());
        mock.set_state(state);
        let manager = ClusterManager::with_defaults(mock, registry());

        let pipeline = manager.create_pipeline("p", "").await;
        let cam = manager.add_node(&pipeline.id, "cam", None, HashMap::new()).await.unwrap();
        let writer = manager.add_node(&pipeline.id, "writer", None, HashMap::new()).await.unwrap();
        manager.add_edge(&pipeline.id, &cam.id, &writer.id, None).await.unwrap();
        let mut assignments = HashMap::new();
        assignments.insert(cam.id.clone(), "worker-1".to_string());
        assignments.insert(writer.id.clone(), "worker-1".to_string());
        manager.assign_workers(&pipeline.id, assignments).await.unwrap();
        (manager, pipeline.id)
    }

    #[tokio::test]
    async fn full_lifecycle_returns_to_initialized() {
        let (manager, pipeline_id) = manager_with_active_pipeline().await;

        manager.instantiate(&pipeline_id).await.unwrap();
        manager.commit().await.unwrap();
        manager.preview().await.unwrap();
        manager.record().await.unwrap();
        manager.stop().await.unwrap();
        manager.collect().await.unwrap();
        manager.reset().await.unwrap();

        let info = manager.get_states_info().await;
        assert_eq!(info.fsm.current_state, "INITIALIZED");
        assert!(info.active_pipeline_id.is_none());

        let pipeline = manager.get_pipeline(&pipeline_id).await.unwrap();
        assert!(!pipeline.instantiated);
        assert!(!pipeline.committed);
    }

    #[tokio::test]
    async fn concurrent_commits_single_flight() {
        let (manager, pipeline_id) = manager_with_active_pipeline().await;
        manager.instantiate(&pipeline_id).await.unwrap();

        let manager = Arc::new(manager);
        let a = manager.clone();
        let b = manager.clone();
        let (first, second) = tokio::join!(a.commit(), async {
            // Give the first call a head start so it wins the latch.
            tokio::task::yield_now().await;
            b.commit().await
        });

        let results = [first, second];
        let ok_count = results.iter().filter(|r| r.is_ok()).count();
        let already = results
            .iter()
            .any(|r| matches!(r, Err(Error::Fsm(cluster_fsm::Error::AlreadyTransitioning))));
        assert_eq!(ok_count, 1);
        assert!(already);
    }

    #[tokio::test]
    async fn instantiate_requires_pipeline_to_exist() {
        let mock = Arc::new(MockWorkerRuntime::new());
        let manager = ClusterManager::with_defaults(mock, registry());
        let err = manager.instantiate("missing").await.unwrap_err();
        assert!(matches!(err, Error::Pipeline(cluster_pipeline::Error::PipelineNotFound(_))));
    }

    #[tokio::test]
    async fn lifecycle_op_without_active_pipeline_fails() {
        let mock = Arc::new(MockWorkerRuntime::new());
        let manager = ClusterManager::with_defaults(mock, registry());
        // INITIALIZED has no /commit transition, so the FSM rejects this
        // before the active-pipeline check is ever reached.
        let err = manager.commit().await.unwrap_err();
        assert!(matches!(err, Error::Fsm(cluster_fsm::Error::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn assign_workers_rejects_unknown_worker_atomically() {
        let mock = Arc::new(MockWorkerRuntime::new());
        let mut state = crate::state::ManagerState::default();
        state.workers.insert("worker-1".into(), Default::default());
        mock.set_state(state);
        let manager = ClusterManager::with_defaults(mock, registry());

        let pipeline = manager.create_pipeline("p", "").await;
        let cam = manager.add_node(&pipeline.id, "cam", None, HashMap::new()).await.unwrap();

        let mut assignments = HashMap::new();
        assignments.insert(cam.id.clone(), "ghost-worker".to_string());
        let err = manager.assign_workers(&pipeline.id, assignments).await.unwrap_err();
        assert!(matches!(err, Error::UnknownWorker(_)));

        let pipeline = manager.get_pipeline(&pipeline.id).await.unwrap();
        assert!(pipeline.nodes[0].worker_id.is_none());
    }

    #[tokio::test]
    async fn subscribe_pipeline_replays_current_snapshot_first() {
        let mock = Arc::new(MockWorkerRuntime::new());
        let manager = ClusterManager::with_defaults(mock, registry());
        let (_id, mut rx) = manager.subscribe_pipeline().await;

        manager.create_pipeline("p", "").await;
        let envelope = rx.recv().await.unwrap();
        match envelope {
            Envelope::Message(update) => assert_eq!(update.fsm.current_state, "INITIALIZED"),
            Envelope::Sentinel => panic!("expected a replay message, not the sentinel"),
        }
    }

    #[tokio::test]
    async fn zeroconf_toggle_is_reflected_in_subsequent_state() {
        let mock = Arc::new(MockWorkerRuntime::new());
        let manager = ClusterManager::with_defaults(mock, registry());
        assert!(!manager.network_relay().zeroconf_enabled());
        manager.enable_zeroconf_discovery().await.unwrap();
        assert!(manager.network_relay().zeroconf_enabled());
        manager.disable_zeroconf_discovery().await.unwrap();
        assert!(!manager.network_relay().zeroconf_enabled());
    }
}
