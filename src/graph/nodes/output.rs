//! Chunk outputs: the height mesh and texture layers

use serde::{Deserialize, Serialize};

use super::extractor::MinMaxExtractorNode;
use super::{fill_map, store_input, KernelPhase};
use crate::graph::branch::BranchData;
use crate::graph::graph::Amplifier;
use crate::graph::node::{NodeId, NodeKind, NodeProcessor, OutputRole};
use crate::graph::port::{PortSpec, ValueKind};
use crate::graph::value::{GraphValue, GridData, HeightData, MaskData, VertexData};

const HEIGHT_PORTS: &[PortSpec] = &[
    PortSpec::input("height", ValueKind::Height),
    PortSpec::input("grid", ValueKind::Grid),
    PortSpec::output("height", ValueKind::Height),
    PortSpec::output("vertices", ValueKind::Vertices),
];

/// Displaces the sampling grid by a height map to form the chunk mesh.
///
/// Vertices are expressed relative to the grid origin. Only one height
/// output per graph is used.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct HeightOutputNode;

impl NodeKind for HeightOutputNode {
    fn type_name(&self) -> &'static str {
        "HeightOutput"
    }

    fn ports(&self) -> &'static [PortSpec] {
        HEIGHT_PORTS
    }

    fn create_processor(&self, node: NodeId) -> Box<dyn NodeProcessor> {
        Box::new(HeightOutputProcessor { node, height: None, grid: None, phase: KernelPhase::Idle })
    }

    fn amplify(&self, node: NodeId, amplifier: &mut Amplifier<'_>) {
        amplifier.connect_default_grid(node, "grid");
        amplifier.insert_before(node, "height", MinMaxExtractorNode, "height", "height");
    }

    fn output_role(&self) -> Option<OutputRole> {
        Some(OutputRole::Height)
    }
}

struct HeightOutputProcessor {
    node: NodeId,
    height: Option<HeightData>,
    grid: Option<GridData>,
    phase: KernelPhase<VertexData>,
}

impl NodeProcessor for HeightOutputProcessor {
    fn set_input_values(&mut self, branch: &mut BranchData<'_>) -> bool {
        let height = branch.pull_height(self.node, "height");
        let grid = branch.pull_grid(self.node, "grid");
        let height_ready = store_input(&mut self.height, height);
        let grid_ready = store_input(&mut self.grid, grid);
        height_ready && grid_ready
    }

    fn process(&mut self, branch: &mut BranchData<'_>) -> bool {
        if self.phase.is_idle() {
            let (Some(height), Some(grid)) = (&self.height, &self.grid) else {
                return false;
            };
            let resolution = grid.resolution();
            let x = branch.allocate_map(resolution);
            let y = branch.allocate_map(resolution);
            let z = branch.allocate_map(resolution);
            let views = (
                branch.map_view(&grid.x),
                branch.map_view(&grid.z),
                branch.map_view(&height.map),
                branch.map_view(&x),
                branch.map_view(&y),
                branch.map_view(&z),
            );
            let (Some(gx), Some(gz), Some(h), Some(vx), Some(vy), Some(vz)) = views else {
                return false;
            };

            let origin = grid.origin;
            let job = branch.schedule(move || {
                fill_map(&vx, |i| gx.get(i) - origin.x);
                fill_map(&vy, |i| h.sample(i, resolution));
                fill_map(&vz, |i| gz.get(i) - origin.y);
            });

            let global_range = height.range;
            let local_range = height.local_range.unwrap_or(global_range);
            self.phase = KernelPhase::Running(VertexData { x, y, z, job, local_range, global_range });
        }
        self.phase.poll()
    }

    fn cache_output_values(&mut self, branch: &mut BranchData<'_>) {
        let (Some(vertices), Some(height)) = (self.phase.done(), &self.height) else {
            return;
        };
        let vertices = vertices.clone();
        branch.publish(self.node, "height", GraphValue::Height(height.clone()));
        branch.publish(self.node, "vertices", GraphValue::Vertices(vertices));
    }
}

const TEXTURE_PORTS: &[PortSpec] = &[
    PortSpec::input("mask", ValueKind::Mask),
    PortSpec::output("mask", ValueKind::Mask),
];

/// Exposes a mask as a texture layer named after the node
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TextureOutputNode;

impl NodeKind for TextureOutputNode {
    fn type_name(&self) -> &'static str {
        "TextureOutput"
    }

    fn ports(&self) -> &'static [PortSpec] {
        TEXTURE_PORTS
    }

    fn create_processor(&self, node: NodeId) -> Box<dyn NodeProcessor> {
        Box::new(TextureOutputProcessor { node, mask: None })
    }

    fn output_role(&self) -> Option<OutputRole> {
        Some(OutputRole::Texture)
    }
}

struct TextureOutputProcessor {
    node: NodeId,
    mask: Option<MaskData>,
}

impl NodeProcessor for TextureOutputProcessor {
    fn set_input_values(&mut self, branch: &mut BranchData<'_>) -> bool {
        let pulled = branch.pull_mask(self.node, "mask");
        store_input(&mut self.mask, pulled)
    }

    fn process(&mut self, _branch: &mut BranchData<'_>) -> bool {
        self.mask.is_some()
    }

    fn cache_output_values(&mut self, branch: &mut BranchData<'_>) {
        if let Some(mask) = &self.mask {
            branch.publish(self.node, "mask", GraphValue::Mask(mask.clone()));
        }
    }
}
