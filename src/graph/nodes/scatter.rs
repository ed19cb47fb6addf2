use glam::{IVec2, Vec3};
use serde::{Deserialize, Serialize};

use super::PointsProcessor;
use crate::graph::node::{NodeId, NodeKind, NodeProcessor};
use crate::graph::port::{PortSpec, ValueKind};
use crate::points::instance::offset_in_cell;
use crate::points::transform::{draws, hash_3d, yaw_from};
use crate::points::{PointGenerator, PointTransform};

const PORTS: &[PortSpec] = &[
    PortSpec::optional_input("height", ValueKind::Height),
    PortSpec::output("points", ValueKind::Points),
];

/// Scatters a fixed number of points uniformly in every cell
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScatterPointsNode {
    pub grid_size: f32,
    pub points_per_cell: u32,
    pub scale_min: f32,
    pub scale_max: f32,
    pub seed_offset: u32,
}

impl Default for ScatterPointsNode {
    fn default() -> Self {
        Self {
            grid_size: 32.0,
            points_per_cell: 4,
            scale_min: 0.8,
            scale_max: 1.2,
            seed_offset: 0,
        }
    }
}

impl NodeKind for ScatterPointsNode {
    fn type_name(&self) -> &'static str {
        "ScatterPoints"
    }

    fn ports(&self) -> &'static [PortSpec] {
        PORTS
    }

    fn create_processor(&self, node: NodeId) -> Box<dyn NodeProcessor> {
        Box::new(PointsProcessor { node, grid_size: self.grid_size, source: None })
    }

    fn point_generator(&self) -> Option<&dyn PointGenerator> {
        Some(self)
    }
}

impl PointGenerator for ScatterPointsNode {
    fn grid_size(&self) -> f32 {
        self.grid_size
    }

    fn generate_cell(&self, cell: IVec2, seed: i32, _upstream: Option<&[PointTransform]>) -> Vec<PointTransform> {
        let seed = (seed as u32).wrapping_add(self.seed_offset);
        (0..self.points_per_cell)
            .map(|k| {
                let [u, v, turn, size] = draws::<4>(hash_3d(cell.x, cell.y, k as i32, seed));
                let p = offset_in_cell(cell, self.grid_size, u, v);
                let scale = self.scale_min + (self.scale_max - self.scale_min) * size;
                PointTransform::new(Vec3::new(p.x, 0.0, p.y), yaw_from(turn), scale)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::cell_of;

    #[test]
    fn test_points_stay_in_their_cell() {
        let node = ScatterPointsNode { grid_size: 8.0, points_per_cell: 16, ..Default::default() };
        for cell in [IVec2::new(0, 0), IVec2::new(-3, 5), IVec2::new(7, -2)] {
            let points = node.generate_cell(cell, 42, None);
            assert_eq!(points.len(), 16);
            for p in &points {
                assert_eq!(cell_of(p.horizontal(), 8.0), cell);
                assert!(p.scale >= node.scale_min && p.scale <= node.scale_max);
            }
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let node = ScatterPointsNode::default();
        let a = node.generate_cell(IVec2::new(2, 3), 7, None);
        let b = node.generate_cell(IVec2::new(2, 3), 7, None);
        let c = node.generate_cell(IVec2::new(2, 3), 8, None);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
