//! Authoring-side node graph

use std::sync::Arc;

use super::compile::CompiledGraph;
use super::node::{NodeId, NodeKind};
use super::nodes::grid::SamplingGridNode;
use crate::core::Diagnostics;

/// Connection from an output port to an input port
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    pub from: NodeId,
    pub from_port: String,
    pub to: NodeId,
    pub to_port: String,
}

pub struct GraphNode {
    pub name: String,
    pub kind: Arc<dyn NodeKind>,
    /// Added by amplification rather than by the author
    pub internal: bool,
}

impl std::fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphNode")
            .field("name", &self.name)
            .field("kind", &self.kind.type_name())
            .field("internal", &self.internal)
            .finish()
    }
}

/// Mutable graph of nodes and edges, compiled once before evaluation
#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<Edge>,
    default_grid: Option<NodeId>,
    amplified: bool,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, kind: impl NodeKind) -> NodeId {
        self.add_shared(name, Arc::new(kind))
    }

    pub fn add_shared(&mut self, name: impl Into<String>, kind: Arc<dyn NodeKind>) -> NodeId {
        self.push_node(name.into(), kind, false)
    }

    fn push_node(&mut self, name: String, kind: Arc<dyn NodeKind>, internal: bool) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(GraphNode { name, kind, internal });
        id
    }

    /// Connect `from.from_port` to `to.to_port`, replacing any edge already
    /// feeding that input
    pub fn connect(&mut self, from: NodeId, from_port: &str, to: NodeId, to_port: &str) {
        self.disconnect(to, to_port);
        self.edges.push(Edge {
            from,
            from_port: from_port.to_string(),
            to,
            to_port: to_port.to_string(),
        });
    }

    pub fn disconnect(&mut self, to: NodeId, to_port: &str) -> bool {
        let before = self.edges.len();
        self.edges.retain(|e| !(e.to == to && e.to_port == to_port));
        self.edges.len() != before
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.index())
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn input_edge(&self, to: NodeId, to_port: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.to == to && e.to_port == to_port)
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.name == name)
            .map(|i| NodeId(i as u32))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_amplified(&self) -> bool {
        self.amplified
    }

    /// Let every node insert its helper nodes. Only the first call has an effect.
    pub fn amplify(&mut self) -> bool {
        if self.amplified {
            return false;
        }
        self.amplified = true;

        let authored = self.nodes.len();
        for index in 0..authored {
            let kind = Arc::clone(&self.nodes[index].kind);
            let mut amplifier = Amplifier { graph: self };
            kind.amplify(NodeId(index as u32), &mut amplifier);
        }

        log::debug!(
            "Amplified graph: {} authored nodes, {} internal",
            authored,
            self.nodes.len() - authored
        );
        true
    }

    pub(crate) fn into_parts(self) -> (Vec<GraphNode>, Vec<Edge>) {
        (self.nodes, self.edges)
    }

    /// Amplify (if needed), validate and freeze the graph
    pub fn compile(self, diagnostics: &Diagnostics) -> CompiledGraph {
        CompiledGraph::compile(self, diagnostics)
    }
}

/// Graph access handed to [`NodeKind::amplify`]
pub struct Amplifier<'a> {
    graph: &'a mut NodeGraph,
}

impl Amplifier<'_> {
    pub fn is_connected(&self, node: NodeId, port: &str) -> bool {
        self.graph.input_edge(node, port).is_some()
    }

    /// The shared sampling grid used for unconnected grid inputs
    pub fn default_grid(&mut self) -> NodeId {
        if let Some(id) = self.graph.default_grid {
            return id;
        }
        let id = self.graph.push_node(
            "default grid".to_string(),
            Arc::new(SamplingGridNode::default()),
            true,
        );
        self.graph.default_grid = Some(id);
        id
    }

    /// Feed `node.port` from the default grid when nothing else does
    pub fn connect_default_grid(&mut self, node: NodeId, port: &str) {
        if !self.is_connected(node, port) {
            let grid = self.default_grid();
            self.graph.connect(grid, "grid", node, port);
        }
    }

    pub fn add_internal(&mut self, name: impl Into<String>, kind: impl NodeKind) -> NodeId {
        self.graph.push_node(name.into(), Arc::new(kind), true)
    }

    pub fn connect(&mut self, from: NodeId, from_port: &str, to: NodeId, to_port: &str) {
        self.graph.connect(from, from_port, to, to_port);
    }

    /// Route whatever feeds `node.port` through a new helper node.
    ///
    /// Returns the helper, or `None` when the input is unconnected.
    pub fn insert_before(
        &mut self,
        node: NodeId,
        port: &str,
        helper: impl NodeKind,
        helper_input: &str,
        helper_output: &str,
    ) -> Option<NodeId> {
        let edge = self.graph.input_edge(node, port)?.clone();
        let name = format!("{} ({})", helper.type_name(), port);
        let helper = self.add_internal(name, helper);
        self.graph.connect(edge.from, &edge.from_port, helper, helper_input);
        self.graph.connect(helper, helper_output, node, port);
        Some(helper)
    }
}
