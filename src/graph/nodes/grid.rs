//! Sampling grid: the XZ sample positions every map is evaluated at

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{fill_map, KernelPhase};
use crate::graph::branch::BranchData;
use crate::graph::node::{NodeId, NodeKind, NodeProcessor};
use crate::graph::port::{PortSpec, ValueKind};
use crate::graph::value::{GraphValue, GridData};
use crate::terrain::config::GenerationMode;

const PORTS: &[PortSpec] = &[PortSpec::output("grid", ValueKind::Grid)];

/// Offset of grid line `index` from the chunk center, for a grid of
/// `resolution` lines spanning `scale`. A single line sits at the center.
pub fn grid_offset(index: u32, resolution: u32, scale: f32) -> f32 {
    if resolution <= 1 {
        0.0
    } else {
        (index as f32 / (resolution - 1) as f32 - 0.5) * scale
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingGridNode {
    /// Lines per side; `None` follows the tree's mesh resolution
    pub resolution: Option<u32>,
}

impl NodeKind for SamplingGridNode {
    fn type_name(&self) -> &'static str {
        "SamplingGrid"
    }

    fn ports(&self) -> &'static [PortSpec] {
        PORTS
    }

    fn create_processor(&self, node: NodeId) -> Box<dyn NodeProcessor> {
        Box::new(GridProcessor {
            node,
            resolution: self.resolution,
            phase: KernelPhase::Idle,
        })
    }
}

struct GridProcessor {
    node: NodeId,
    resolution: Option<u32>,
    phase: KernelPhase<GridData>,
}

impl NodeProcessor for GridProcessor {
    fn set_input_values(&mut self, _branch: &mut BranchData<'_>) -> bool {
        true
    }

    fn process(&mut self, branch: &mut BranchData<'_>) -> bool {
        if self.phase.is_idle() {
            let settings = *branch.settings();
            let anchor = branch.configuration().position;
            let resolution = self.resolution.unwrap_or(settings.resolution).max(1);
            let scale = settings.mesh_scale;
            let origin = match settings.mode {
                GenerationMode::WorldRelative => Vec2::new(anchor.x, anchor.z),
                GenerationMode::TerrainRelative => Vec2::ZERO,
            };

            let x = branch.allocate_map(resolution);
            let z = branch.allocate_map(resolution);
            let (Some(x_view), Some(z_view)) = (branch.map_view(&x), branch.map_view(&z)) else {
                return false;
            };

            let job = branch.schedule(move || {
                let width = resolution as usize;
                fill_map(&x_view, |i| origin.x + grid_offset((i % width) as u32, resolution, scale));
                fill_map(&z_view, |i| origin.y + grid_offset((i / width) as u32, resolution, scale));
            });
            self.phase = KernelPhase::Running(GridData { x, z, origin, job });
        }
        self.phase.poll()
    }

    fn cache_output_values(&mut self, branch: &mut BranchData<'_>) {
        if let Some(grid) = self.phase.done() {
            branch.publish(self.node, "grid", GraphValue::Grid(grid.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_offset_spans_scale() {
        assert_eq!(grid_offset(0, 5, 100.0), -50.0);
        assert_eq!(grid_offset(2, 5, 100.0), 0.0);
        assert_eq!(grid_offset(4, 5, 100.0), 50.0);
    }

    #[test]
    fn test_single_line_grid_is_centered() {
        assert_eq!(grid_offset(0, 1, 100.0), 0.0);
    }
}
