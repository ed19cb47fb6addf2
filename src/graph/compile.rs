//! Graph validation and freezing
//!
//! Compilation resolves every edge to port indices, checks value kinds,
//! orders nodes topologically and marks nodes that cannot be evaluated.
//! Invalid nodes are reported once here and then excluded from every tree;
//! an optional input fed by an invalid node is treated as unconnected.

use std::collections::VecDeque;
use std::sync::Arc;

use super::graph::NodeGraph;
use super::node::{NodeId, NodeKind, OutputRole};
use super::port::{PortSpec, PortTable};
use crate::core::{DiagnosticKind, Diagnostics};

/// Producer of an input: node and output port index
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputSource {
    pub node: NodeId,
    pub port: usize,
}

/// Result of resolving an input port by name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputLookup {
    Connected(InputSource),
    Unconnected,
    UnknownPort,
}

pub struct CompiledNode {
    pub name: String,
    pub kind: Arc<dyn NodeKind>,
    pub ports: PortTable,
    /// Producer per input port, in port order
    pub inputs: Vec<Option<InputSource>>,
    pub valid: bool,
    pub internal: bool,
}

impl CompiledNode {
    fn label(&self) -> String {
        format!("'{}' ({})", self.name, self.kind.type_name())
    }
}

/// Immutable, validated graph shared by every tree
pub struct CompiledGraph {
    nodes: Vec<CompiledNode>,
    /// Valid nodes in dependency order
    order: Vec<NodeId>,
    /// Position of each node in `order`, `usize::MAX` when invalid
    rank: Vec<usize>,
    height_output: Option<NodeId>,
    texture_outputs: Vec<NodeId>,
    point_nodes: Vec<NodeId>,
}

impl CompiledGraph {
    pub(crate) fn compile(mut graph: NodeGraph, diagnostics: &Diagnostics) -> Self {
        graph.amplify();
        let (authored, edges) = graph.into_parts();

        let mut nodes: Vec<CompiledNode> = authored
            .into_iter()
            .map(|n| {
                let ports = PortTable::from_specs(n.kind.ports());
                CompiledNode {
                    inputs: vec![None; ports.inputs.len()],
                    ports,
                    name: n.name,
                    kind: n.kind,
                    valid: true,
                    internal: n.internal,
                }
            })
            .collect();

        // Resolve edges to port indices
        for edge in &edges {
            let source = nodes.get(edge.from.index()).map(|from| {
                let port = from.ports.output_index(&edge.from_port);
                (from.label(), port, port.map(|p| from.ports.outputs[p].kind))
            });
            let Some(to) = nodes.get_mut(edge.to.index()) else {
                diagnostics.report(
                    DiagnosticKind::InvalidNode,
                    format!("edge targets unknown node {}", edge.to),
                );
                continue;
            };

            let (from_label, out_port, out_kind) = match source {
                Some((label, Some(port), Some(kind))) => (label, port, kind),
                Some((label, _, _)) => {
                    diagnostics.report(
                        DiagnosticKind::InvalidNode,
                        format!("{} has no output '{}' (feeding {})", label, edge.from_port, to.label()),
                    );
                    to.valid = false;
                    continue;
                }
                None => {
                    diagnostics.report(
                        DiagnosticKind::InvalidNode,
                        format!("{} is fed by unknown node {}", to.label(), edge.from),
                    );
                    to.valid = false;
                    continue;
                }
            };

            let Some(in_port) = to.ports.input_index(&edge.to_port) else {
                diagnostics.report(
                    DiagnosticKind::InvalidNode,
                    format!("{} has no input '{}'", to.label(), edge.to_port),
                );
                to.valid = false;
                continue;
            };

            let in_kind = to.ports.inputs[in_port].kind;
            if in_kind != out_kind {
                diagnostics.report(
                    DiagnosticKind::InvalidNode,
                    format!(
                        "{} input '{}' expects {:?} but {} '{}' produces {:?}",
                        to.label(), edge.to_port, in_kind, from_label, edge.from_port, out_kind
                    ),
                );
                to.valid = false;
                continue;
            }

            to.inputs[in_port] = Some(InputSource { node: edge.from, port: out_port });
        }

        // Required inputs
        for node in nodes.iter_mut() {
            let missing: Vec<&'static str> = node
                .ports
                .inputs
                .iter()
                .zip(&node.inputs)
                .filter(|(spec, source)| spec.required && source.is_none())
                .map(|(spec, _)| spec.name)
                .collect();
            if !missing.is_empty() {
                diagnostics.report(
                    DiagnosticKind::InvalidNode,
                    format!("{} is missing required inputs {:?}", node.label(), missing),
                );
                node.valid = false;
            }
        }

        let order = Self::topological_order(&mut nodes, diagnostics);
        Self::propagate_invalid(&mut nodes, &order, diagnostics);

        let order: Vec<NodeId> = order.into_iter().filter(|id| nodes[id.index()].valid).collect();
        let mut rank = vec![usize::MAX; nodes.len()];
        for (position, id) in order.iter().enumerate() {
            rank[id.index()] = position;
        }

        let mut height_output = None;
        let mut texture_outputs = Vec::new();
        let mut point_nodes = Vec::new();
        for &id in &order {
            let node = &nodes[id.index()];
            match node.kind.output_role() {
                Some(OutputRole::Height) if height_output.is_some() => {
                    diagnostics.report(
                        DiagnosticKind::InvalidNode,
                        format!("{} is a second height output and is ignored", node.label()),
                    );
                }
                Some(OutputRole::Height) => height_output = Some(id),
                Some(OutputRole::Texture) => texture_outputs.push(id),
                None => {}
            }
            if node.kind.point_generator().is_some() {
                point_nodes.push(id);
            }
        }

        log::info!(
            "Compiled graph: {} nodes ({} valid), {} texture outputs, {} point generators",
            nodes.len(),
            order.len(),
            texture_outputs.len(),
            point_nodes.len()
        );

        Self { nodes, order, rank, height_output, texture_outputs, point_nodes }
    }

    /// Kahn's algorithm over resolved edges; nodes left over sit on or behind a cycle
    fn topological_order(nodes: &mut [CompiledNode], diagnostics: &Diagnostics) -> Vec<NodeId> {
        let mut indegree = vec![0usize; nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (index, node) in nodes.iter().enumerate() {
            for source in node.inputs.iter().flatten() {
                indegree[index] += 1;
                dependents[source.node.index()].push(index);
            }
        }

        let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(nodes.len());
        while let Some(index) = queue.pop_front() {
            order.push(NodeId(index as u32));
            for &dependent in &dependents[index] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        for (index, node) in nodes.iter_mut().enumerate() {
            if indegree[index] > 0 {
                diagnostics.report(
                    DiagnosticKind::Cycle,
                    format!("{} is on or downstream of a cycle", node.label()),
                );
                node.valid = false;
            }
        }

        order
    }

    fn propagate_invalid(nodes: &mut [CompiledNode], order: &[NodeId], diagnostics: &Diagnostics) {
        for &id in order {
            let index = id.index();
            for port in 0..nodes[index].inputs.len() {
                let Some(source) = nodes[index].inputs[port] else { continue };
                if nodes[source.node.index()].valid {
                    continue;
                }
                let spec = nodes[index].ports.inputs[port];
                if spec.required {
                    if nodes[index].valid {
                        diagnostics.report(
                            DiagnosticKind::InvalidNode,
                            format!(
                                "{} depends on invalid node through '{}'",
                                nodes[index].label(),
                                spec.name
                            ),
                        );
                    }
                    nodes[index].valid = false;
                } else {
                    log::debug!(
                        "{}: optional input '{}' fed by an invalid node, treating as unconnected",
                        nodes[index].label(),
                        spec.name
                    );
                    nodes[index].inputs[port] = None;
                }
            }
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&CompiledNode> {
        self.nodes.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_valid(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.valid)
    }

    /// Valid nodes in dependency order
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.name == name)
            .map(|i| NodeId(i as u32))
    }

    pub fn input_source(&self, node: NodeId, port: &str) -> InputLookup {
        let Some(compiled) = self.node(node) else {
            return InputLookup::UnknownPort;
        };
        match compiled.ports.input_index(port) {
            Some(index) => match compiled.inputs[index] {
                Some(source) => InputLookup::Connected(source),
                None => InputLookup::Unconnected,
            },
            None => InputLookup::UnknownPort,
        }
    }

    pub fn output_index(&self, node: NodeId, port: &str) -> Option<usize> {
        self.node(node)?.ports.output_index(port)
    }

    pub fn output_spec(&self, node: NodeId, port: usize) -> Option<&PortSpec> {
        self.node(node)?.ports.outputs.get(port)
    }

    /// Every valid node `roots` depend on (roots included), in dependency order
    pub fn upstream_of(&self, roots: &[NodeId]) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeId> = roots.iter().copied().filter(|&r| self.is_valid(r)).collect();
        let mut found = Vec::new();

        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut visited[id.index()], true) {
                continue;
            }
            found.push(id);
            for source in self.nodes[id.index()].inputs.iter().flatten() {
                if self.is_valid(source.node) && !visited[source.node.index()] {
                    stack.push(source.node);
                }
            }
        }

        found.sort_by_key(|id| self.rank[id.index()]);
        found
    }

    pub fn height_output(&self) -> Option<NodeId> {
        self.height_output
    }

    pub fn texture_outputs(&self) -> &[NodeId] {
        &self.texture_outputs
    }

    pub fn point_nodes(&self) -> &[NodeId] {
        &self.point_nodes
    }

    /// Nodes a chunk tree must complete
    pub fn chunk_outputs(&self) -> Vec<NodeId> {
        self.height_output
            .iter()
            .chain(self.texture_outputs.iter())
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::nodes::{CombineNode, CombineOp, ConstantNode, HeightOutputNode, NoiseNode, ThresholdMaskNode};

    #[test]
    fn test_amplification_adds_helpers() {
        let mut graph = NodeGraph::new();
        let noise = graph.add_node("noise", NoiseNode::default());
        let output = graph.add_node("output", HeightOutputNode);
        graph.connect(noise, "height", output, "height");

        let diagnostics = Diagnostics::default();
        let compiled = graph.compile(&diagnostics);

        // default grid + extractor
        assert_eq!(compiled.len(), 4);
        assert_eq!(diagnostics.total(), 0);
        assert_eq!(compiled.height_output(), Some(output));

        // Output height now comes from the extractor, which reads the noise
        let InputLookup::Connected(source) = compiled.input_source(output, "height") else {
            panic!("output height should be connected");
        };
        assert_ne!(source.node, noise);
        assert!(compiled.node(source.node).unwrap().internal);
        assert_eq!(
            compiled.input_source(source.node, "height"),
            InputLookup::Connected(InputSource { node: noise, port: 0 })
        );

        // Noise and output share the one default grid
        let InputLookup::Connected(noise_grid) = compiled.input_source(noise, "grid") else {
            panic!("noise grid should be connected");
        };
        let InputLookup::Connected(output_grid) = compiled.input_source(output, "grid") else {
            panic!("output grid should be connected");
        };
        assert_eq!(noise_grid.node, output_grid.node);
    }

    #[test]
    fn test_kind_mismatch_invalidates_target() {
        let mut graph = NodeGraph::new();
        let constant = graph.add_node("constant", ConstantNode::new(1.0));
        let mask = graph.add_node("mask", ThresholdMaskNode::default());
        let combine = graph.add_node("combine", CombineNode::new(CombineOp::Add));
        graph.connect(constant, "height", combine, "a");
        graph.connect(mask, "mask", combine, "b");
        graph.connect(constant, "height", mask, "height");

        let diagnostics = Diagnostics::default();
        let compiled = graph.compile(&diagnostics);

        assert!(compiled.is_valid(constant));
        assert!(compiled.is_valid(mask));
        assert!(!compiled.is_valid(combine));
        assert!(diagnostics.count(DiagnosticKind::InvalidNode) >= 1);
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = NodeGraph::new();
        let a = graph.add_node("a", CombineNode::new(CombineOp::Add));
        let b = graph.add_node("b", CombineNode::new(CombineOp::Add));
        let c = graph.add_node("c", ConstantNode::new(2.0));
        graph.connect(c, "height", a, "a");
        graph.connect(b, "height", a, "b");
        graph.connect(c, "height", b, "a");
        graph.connect(a, "height", b, "b");

        let diagnostics = Diagnostics::default();
        let compiled = graph.compile(&diagnostics);

        assert!(compiled.is_valid(c));
        assert!(!compiled.is_valid(a));
        assert!(!compiled.is_valid(b));
        assert_eq!(diagnostics.count(DiagnosticKind::Cycle), 2);
        assert_eq!(compiled.order(), &[c]);
    }

    #[test]
    fn test_invalid_upstream_propagates() {
        let mut graph = NodeGraph::new();
        // Missing both required inputs
        let broken = graph.add_node("broken", CombineNode::new(CombineOp::Max));
        let output = graph.add_node("output", HeightOutputNode);
        graph.connect(broken, "height", output, "height");

        let diagnostics = Diagnostics::default();
        let compiled = graph.compile(&diagnostics);

        assert!(!compiled.is_valid(broken));
        assert!(!compiled.is_valid(output));
        assert_eq!(compiled.height_output(), None);
        assert!(compiled.chunk_outputs().is_empty());
    }

    #[test]
    fn test_upstream_in_dependency_order() {
        let mut graph = NodeGraph::new();
        let a = graph.add_node("a", ConstantNode::new(1.0));
        let b = graph.add_node("b", ConstantNode::new(2.0));
        let unrelated = graph.add_node("unrelated", ConstantNode::new(3.0));
        let sum = graph.add_node("sum", CombineNode::new(CombineOp::Add));
        graph.connect(a, "height", sum, "a");
        graph.connect(b, "height", sum, "b");

        let compiled = graph.compile(&Diagnostics::default());
        let upstream = compiled.upstream_of(&[sum]);

        assert_eq!(upstream.len(), 3);
        assert_eq!(upstream.last(), Some(&sum));
        assert!(!upstream.contains(&unrelated));
    }
}
