//! Serialized graph descriptions
//!
//! A [`GraphDescription`] lists named nodes with their kind and parameters,
//! and edges written as `"node.port"`. A [`NodeRegistry`] maps kind names to
//! constructors.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::graph::NodeGraph;
use super::node::NodeKind;
use super::nodes::{
    CombineNode, ConstantNode, HeightOutputNode, NoiseNode, SamplingGridNode, ScatterPointsNode, SpawnAroundNode,
    TextureOutputNode, ThresholdMaskNode,
};
use crate::core::{Error, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeDescription {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeDescription {
    /// `"node.port"` of the producer
    pub from: String,
    /// `"node.port"` of the consumer
    pub to: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GraphDescription {
    pub nodes: Vec<NodeDescription>,
    #[serde(default)]
    pub edges: Vec<EdgeDescription>,
}

impl GraphDescription {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn add_node(&mut self, name: &str, kind: &str, params: serde_json::Value) -> &mut Self {
        self.nodes.push(NodeDescription { name: name.to_string(), kind: kind.to_string(), params });
        self
    }

    pub fn connect(&mut self, from: &str, to: &str) -> &mut Self {
        self.edges.push(EdgeDescription { from: from.to_string(), to: to.to_string() });
        self
    }

    /// Instantiate every node and edge
    pub fn build(&self, registry: &NodeRegistry) -> Result<NodeGraph> {
        let mut graph = NodeGraph::new();
        for node in &self.nodes {
            if graph.find(&node.name).is_some() {
                return Err(Error::Graph(format!("duplicate node name '{}'", node.name)));
            }
            let kind = registry.create(&node.kind, node.params.clone())?;
            graph.add_shared(node.name.clone(), kind);
        }

        for edge in &self.edges {
            let (from, from_port) = split_endpoint(&edge.from)?;
            let (to, to_port) = split_endpoint(&edge.to)?;
            let from = graph
                .find(from)
                .ok_or_else(|| Error::Graph(format!("edge from unknown node '{}'", from)))?;
            let to = graph
                .find(to)
                .ok_or_else(|| Error::Graph(format!("edge to unknown node '{}'", to)))?;
            graph.connect(from, from_port, to, to_port);
        }

        log::info!(
            "Built graph: {} nodes, {} edges",
            self.nodes.len(),
            self.edges.len()
        );
        Ok(graph)
    }
}

fn split_endpoint(endpoint: &str) -> Result<(&str, &str)> {
    endpoint
        .rsplit_once('.')
        .filter(|(node, port)| !node.is_empty() && !port.is_empty())
        .ok_or_else(|| Error::Graph(format!("edge endpoint '{}' is not 'node.port'", endpoint)))
}

type NodeFactory = Box<dyn Fn(serde_json::Value) -> Result<Arc<dyn NodeKind>> + Send + Sync>;

/// Constructors for node kinds, by name
#[derive(Default)]
pub struct NodeRegistry {
    factories: HashMap<String, NodeFactory>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of every built-in node kind
    pub fn with_builtin_nodes() -> Self {
        let mut registry = Self::new();
        registry.register("SamplingGrid", |p: SamplingGridNode| p);
        registry.register("Constant", |p: ConstantNode| p);
        registry.register("Noise", |p: NoiseNode| p);
        registry.register("Combine", |p: CombineNode| p);
        registry.register("ThresholdMask", |p: ThresholdMaskNode| p);
        registry.register("HeightOutput", |p: HeightOutputNode| p);
        registry.register("TextureOutput", |p: TextureOutputNode| p);
        registry.register("ScatterPoints", |p: ScatterPointsNode| p);
        registry.register("SpawnAround", |p: SpawnAroundNode| p);
        registry
    }

    /// Register `kind`, built by `build` from its deserialized parameters.
    /// Replaces an existing registration.
    pub fn register<P, N, F>(&mut self, kind: &str, build: F)
    where
        P: DeserializeOwned,
        N: NodeKind,
        F: Fn(P) -> N + Send + Sync + 'static,
    {
        let name = kind.to_string();
        let factory: NodeFactory = Box::new(move |params| {
            // Missing parameters: unit kinds take null, parameterized kinds their defaults
            let parsed = if params.is_null() {
                serde_json::from_value::<P>(serde_json::Value::Null)
                    .or_else(|_| serde_json::from_value::<P>(serde_json::json!({})))
            } else {
                serde_json::from_value::<P>(params)
            };
            let params = parsed.map_err(|e| Error::Graph(format!("bad parameters for {}: {}", name, e)))?;
            Ok(Arc::new(build(params)) as Arc<dyn NodeKind>)
        });
        self.factories.insert(kind.to_string(), factory);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn create(&self, kind: &str, params: serde_json::Value) -> Result<Arc<dyn NodeKind>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| Error::Graph(format!("unknown node kind '{}'", kind)))?;
        factory(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Diagnostics;

    const TERRAIN: &str = r#"{
        "nodes": [
            { "name": "noise", "kind": "Noise", "params": { "amplitude": 10.0 } },
            { "name": "output", "kind": "HeightOutput" },
            { "name": "rocks", "kind": "ScatterPoints", "params": { "grid_size": 16.0 } }
        ],
        "edges": [
            { "from": "noise.height", "to": "output.height" },
            { "from": "noise.height", "to": "rocks.height" }
        ]
    }"#;

    #[test]
    fn test_build_from_json() {
        let description = GraphDescription::from_json(TERRAIN).unwrap();
        let graph = description.build(&NodeRegistry::with_builtin_nodes()).unwrap();
        assert_eq!(graph.len(), 3);

        let diagnostics = Diagnostics::default();
        let compiled = graph.compile(&diagnostics);
        assert_eq!(diagnostics.total(), 0);
        assert_eq!(compiled.height_output(), compiled.find("output"));
        assert_eq!(compiled.point_nodes(), &[compiled.find("rocks").unwrap()]);
    }

    #[test]
    fn test_unknown_kind_is_an_error() {
        let mut description = GraphDescription::default();
        description.add_node("x", "Teapot", serde_json::Value::Null);
        let err = description.build(&NodeRegistry::with_builtin_nodes()).unwrap_err();
        assert!(matches!(err, Error::Graph(_)));
    }

    #[test]
    fn test_bad_endpoint_is_an_error() {
        let mut description = GraphDescription::default();
        description
            .add_node("a", "Constant", serde_json::json!({ "value": 1.0 }))
            .add_node("b", "HeightOutput", serde_json::Value::Null)
            .connect("a", "b.height");
        assert!(description.build(&NodeRegistry::with_builtin_nodes()).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let description = GraphDescription::from_json(TERRAIN).unwrap();
        description.save(&path).unwrap();

        let loaded = GraphDescription::load(&path).unwrap();
        assert_eq!(loaded.nodes.len(), 3);
        assert_eq!(loaded.edges[1].to, "rocks.height");
    }
}
