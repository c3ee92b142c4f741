//! The pipelines collection: every pipeline known to one controller.

use indexmap::IndexMap;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::graph::Pipeline;
use crate::registry::NodeRegistry;

/// Owns every [`Pipeline`] known to one controller, keyed by id.
///
/// Backed by an [`IndexMap`] rather than a `HashMap` so that iteration (and
/// therefore [`Pipelines::by_name`] and [`Pipelines::list_web_json`])
/// observes pipelines in the order they were created, per §3 ("Lookup by
/// name returns all pipelines with matching name in insertion order").
///
/// Scoped per-controller rather than process-global: a process hosting more
/// than one controller gets one `Pipelines` collection each.
#[derive(Debug, Default)]
pub struct Pipelines {
    pipelines: IndexMap<String, Pipeline>,
}

impl Pipelines {
    /// An empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register an empty pipeline.
    pub fn create(&mut self, name: impl Into<String>, description: impl Into<String>) -> &Pipeline {
        let pipeline = Pipeline::new(name, description);
        let id = pipeline.id().to_string();
        self.pipelines.insert(id.clone(), pipeline);
        self.pipelines.get(&id).expect("just inserted")
    }

    /// Build and register a pipeline from a declarative configuration
    /// document, resolving node templates against `registry`.
    pub fn create_from_config(
        &mut self,
        config: &PipelineConfig,
        registry: &NodeRegistry,
    ) -> Result<&Pipeline> {
        let pipeline = Pipeline::from_config(config, registry)?;
        let id = pipeline.id().to_string();
        self.pipelines.insert(id.clone(), pipeline);
        Ok(self.pipelines.get(&id).expect("just inserted"))
    }

    /// Look up a pipeline by id.
    pub fn get(&self, pipeline_id: &str) -> Result<&Pipeline> {
        self.pipelines
            .get(pipeline_id)
            .ok_or_else(|| Error::PipelineNotFound(pipeline_id.to_string()))
    }

    /// Look up a pipeline by id, mutably.
    pub fn get_mut(&mut self, pipeline_id: &str) -> Result<&mut Pipeline> {
        self.pipelines
            .get_mut(pipeline_id)
            .ok_or_else(|| Error::PipelineNotFound(pipeline_id.to_string()))
    }

    /// Look up every pipeline whose name matches, in insertion order. Names
    /// are not guaranteed unique.
    pub fn by_name(&self, name: &str) -> Vec<&Pipeline> {
        self.pipelines.values().filter(|p| p.name() == name).collect()
    }

    /// Remove a pipeline from the collection, returning it. Uses
    /// `shift_remove` so the remaining pipelines keep their relative
    /// insertion order.
    pub fn remove(&mut self, pipeline_id: &str) -> Result<Pipeline> {
        self.pipelines
            .shift_remove(pipeline_id)
            .ok_or_else(|| Error::PipelineNotFound(pipeline_id.to_string()))
    }

    /// Iterate over every pipeline in the collection, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.values()
    }

    /// Number of pipelines currently registered.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Project every registered pipeline into its web-JSON shape, in
    /// insertion order.
    pub fn list_web_json(&self) -> Vec<crate::graph::WebPipeline> {
        self.pipelines.values().map(Pipeline::to_web_json).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{NodeKind, NodeTemplate};

    fn registry() -> NodeRegistry {
        let mut r = NodeRegistry::new();
        r.register(NodeTemplate::new("cam", None, NodeKind::Source));
        r.register(NodeTemplate::new("writer", None, NodeKind::Sink));
        r
    }

    #[test]
    fn create_registers_and_get_finds_it() {
        let mut pipelines = Pipelines::new();
        let id = pipelines.create("demo", "").id().to_string();
        assert!(pipelines.get(&id).is_ok());
        assert_eq!(pipelines.len(), 1);
    }

    #[test]
    fn remove_drops_pipeline_from_collection() {
        let mut pipelines = Pipelines::new();
        let id = pipelines.create("demo", "").id().to_string();
        pipelines.remove(&id).unwrap();
        assert!(pipelines.get(&id).is_err());
        assert!(pipelines.is_empty());
    }

    #[test]
    fn by_name_returns_every_match_in_insertion_order() {
        let mut pipelines = Pipelines::new();
        let first = pipelines.create("demo", "").id().to_string();
        pipelines.create("other", "");
        let third = pipelines.create("demo", "").id().to_string();

        let matches = pipelines.by_name("demo");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id(), first);
        assert_eq!(matches[1].id(), third);
        assert!(pipelines.by_name("nope").is_empty());
    }

    #[test]
    fn create_from_config_resolves_templates_and_edges() {
        use crate::config::PipelineConfig;

        let reg = registry();
        let config: PipelineConfig = serde_json::from_value(serde_json::json!({
            "name": "ingest",
            "nodes": ["cam", "writer"],
            "adj": [["cam", "writer"]],
        }))
        .unwrap();

        let mut pipelines = Pipelines::new();
        let pipeline = pipelines.create_from_config(&config, &reg).unwrap();
        assert_eq!(pipeline.nodes().count(), 2);
        assert_eq!(pipeline.edges().count(), 1);
    }

    #[test]
    fn list_web_json_covers_every_registered_pipeline_in_order() {
        let mut pipelines = Pipelines::new();
        pipelines.create("a", "");
        pipelines.create("b", "");
        let projected = pipelines.list_web_json();
        assert_eq!(projected.len(), 2);
        assert_eq!(projected[0].name, "a");
        assert_eq!(projected[1].name, "b");
    }
}
