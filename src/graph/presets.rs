//! Ready-made graphs

use super::graph::NodeGraph;
use super::node::NodeId;
use super::nodes::{
    CombineNode, CombineOp, HeightOutputNode, NoiseNode, ScatterPointsNode, SpawnAroundNode, TextureOutputNode,
    ThresholdMaskNode,
};

/// Nodes of [`default_terrain`] consumers usually address
#[derive(Clone, Copy, Debug)]
pub struct DefaultTerrain {
    pub output: NodeId,
    pub snow: NodeId,
    pub trees: NodeId,
    pub shrubs: NodeId,
}

/// Rolling hills with ridged detail, a snow layer and two point layers
pub fn default_terrain(seed_offset: u32) -> (NodeGraph, DefaultTerrain) {
    let mut graph = NodeGraph::new();

    let hills = graph.add_node(
        "hills",
        NoiseNode { wavelength: 512.0, amplitude: 48.0, base_height: 16.0, seed_offset, ..Default::default() },
    );
    let detail = graph.add_node(
        "detail",
        NoiseNode {
            wavelength: 64.0,
            amplitude: 4.0,
            octaves: 3,
            seed_offset: seed_offset.wrapping_add(1),
            ..Default::default()
        },
    );
    let terrain = graph.add_node("terrain", CombineNode::new(CombineOp::Add));
    graph.connect(hills, "height", terrain, "a");
    graph.connect(detail, "height", terrain, "b");

    let output = graph.add_node("output", HeightOutputNode);
    graph.connect(terrain, "height", output, "height");

    let snow_mask = graph.add_node("snow mask", ThresholdMaskNode { min: 40.0, max: f32::MAX, falloff: 8.0 });
    graph.connect(terrain, "height", snow_mask, "height");
    let snow = graph.add_node("snow", TextureOutputNode);
    graph.connect(snow_mask, "mask", snow, "mask");

    let trees = graph.add_node("trees", ScatterPointsNode { grid_size: 32.0, points_per_cell: 2, ..Default::default() });
    graph.connect(terrain, "height", trees, "height");
    let shrubs = graph.add_node("shrubs", SpawnAroundNode::default());
    graph.connect(trees, "points", shrubs, "source");
    graph.connect(terrain, "height", shrubs, "height");

    (graph, DefaultTerrain { output, snow, trees, shrubs })
}

/// A single noise layer feeding the height output
pub fn noise_terrain(noise: NoiseNode) -> (NodeGraph, NodeId) {
    let mut graph = NodeGraph::new();
    let noise = graph.add_node("noise", noise);
    let output = graph.add_node("output", HeightOutputNode);
    graph.connect(noise, "height", output, "height");
    (graph, output)
}
