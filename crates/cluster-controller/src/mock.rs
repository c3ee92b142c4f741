//! An in-memory [`WorkerRuntime`] test double (§4.6), grounded in the
//! teacher's `mock_transport.rs` pattern: a fake that implements the real
//! trait instead of a hand-rolled stand-in, usable both by this crate's own
//! tests and by downstream integration tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::runtime::{InstantiatedGraph, WorkerGraphMapping, WorkerRuntime};
use crate::state::ManagerState;

/// Per-call behavior a test can script onto a [`MockWorkerRuntime`] method.
#[derive(Default)]
struct Script {
    fail_with: Option<String>,
    latency: Option<Duration>,
}

/// A [`WorkerRuntime`] double that records every call it receives and lets
/// tests script a failure or artificial latency per method name.
pub struct MockWorkerRuntime {
    host: String,
    port: u16,
    calls: Mutex<Vec<&'static str>>,
    scripts: Mutex<HashMap<&'static str, Script>>,
    state: Mutex<ManagerState>,
    zeroconf_enabled: Mutex<bool>,
}

impl MockWorkerRuntime {
    /// A mock with an empty state snapshot and no scripted failures.
    pub fn new() -> Self {
        Self {
            host: "mock".to_string(),
            port: 0,
            calls: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
            state: Mutex::new(ManagerState::default()),
            zeroconf_enabled: Mutex::new(false),
        }
    }

    /// Replace the state snapshot [`WorkerRuntime::state`] returns.
    pub fn set_state(&self, state: ManagerState) {
        *self.state.lock().expect("mock state lock poisoned") = state;
    }

    /// Make the next (and every subsequent) call to `method` fail with
    /// [`Error::WorkerRuntimeFailure`].
    pub fn fail(&self, method: &'static str, message: impl Into<String>) {
        self.scripts
            .lock()
            .expect("mock scripts lock poisoned")
            .entry(method)
            .or_default()
            .fail_with = Some(message.into());
    }

    /// Delay every subsequent call to `method` by `latency` before it
    /// resolves, simulating a slow worker runtime.
    pub fn delay(&self, method: &'static str, latency: Duration) {
        self.scripts
            .lock()
            .expect("mock scripts lock poisoned")
            .entry(method)
            .or_default()
            .latency = Some(latency);
    }

    /// The methods invoked so far, in call order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("mock calls lock poisoned").clone()
    }

    /// Number of times `method` was invoked.
    pub fn call_count(&self, method: &'static str) -> usize {
        self.calls().iter().filter(|m| **m == method).count()
    }

    async fn record(&self, method: &'static str) -> Result<()> {
        self.calls
            .lock()
            .expect("mock calls lock poisoned")
            .push(method);
        let (fail_with, latency) = {
            let scripts = self.scripts.lock().expect("mock scripts lock poisoned");
            match scripts.get(method) {
                Some(script) => (script.fail_with.clone(), script.latency),
                None => (None, None),
            }
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(message) = fail_with {
            return Err(Error::WorkerRuntimeFailure(message));
        }
        Ok(())
    }
}

impl Default for MockWorkerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerRuntime for MockWorkerRuntime {
    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    async fn state(&self) -> Result<ManagerState> {
        self.record("state").await?;
        Ok(self.state.lock().expect("mock state lock poisoned").clone())
    }

    async fn async_commit(
        &self,
        _graph: &InstantiatedGraph,
        _mapping: &WorkerGraphMapping,
    ) -> Result<()> {
        self.record("async_commit").await
    }

    async fn async_start(&self) -> Result<()> {
        self.record("async_start").await
    }

    async fn async_record(&self) -> Result<()> {
        self.record("async_record").await
    }

    async fn async_stop(&self) -> Result<()> {
        self.record("async_stop").await
    }

    async fn async_collect(&self) -> Result<()> {
        self.record("async_collect").await
    }

    async fn async_reset(&self, _keep_workers: bool) -> Result<()> {
        self.record("async_reset").await
    }

    async fn async_shutdown(&self) -> Result<()> {
        self.record("async_shutdown").await
    }

    async fn zeroconf(&self, enable: bool) -> Result<()> {
        self.record("zeroconf").await?;
        *self.zeroconf_enabled.lock().expect("mock zeroconf lock poisoned") = enable;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_in_order() {
        let mock = MockWorkerRuntime::new();
        mock.async_start().await.unwrap();
        mock.async_record().await.unwrap();
        assert_eq!(mock.calls(), vec!["async_start", "async_record"]);
    }

    #[tokio::test]
    async fn scripted_failure_surfaces_as_worker_runtime_failure() {
        let mock = MockWorkerRuntime::new();
        mock.fail("async_commit", "graph rejected");
        let err = mock
            .async_commit(&InstantiatedGraph {
                id: "p".into(),
                name: "p".into(),
                description: String::new(),
                instantiated: true,
                committed: false,
                nodes: vec![],
                edges: vec![],
            }, &WorkerGraphMapping::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WorkerRuntimeFailure(msg) if msg == "graph rejected"));
    }

    #[tokio::test]
    async fn zeroconf_updates_flag_and_is_recorded() {
        let mock = MockWorkerRuntime::new();
        mock.zeroconf(true).await.unwrap();
        assert_eq!(*mock.zeroconf_enabled.lock().unwrap(), true);
        assert_eq!(mock.call_count("zeroconf"), 1);
    }
}
