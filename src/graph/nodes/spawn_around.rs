use glam::{IVec2, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::PointsProcessor;
use crate::graph::node::{NodeId, NodeKind, NodeProcessor};
use crate::graph::port::{PortSpec, ValueKind};
use crate::points::transform::{cell_of, draws, yaw_from};
use crate::points::{PointGenerator, PointTransform};

const PORTS: &[PortSpec] = &[
    PortSpec::input("source", ValueKind::Points),
    PortSpec::optional_input("height", ValueKind::Height),
    PortSpec::output("points", ValueKind::Points),
];

/// Places `count` points within `radius` of every source point.
///
/// Children are derived from their parent's hash alone, so every cell that
/// sees a parent agrees on its children; each child is kept only by the
/// cell it lands in.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnAroundNode {
    pub grid_size: f32,
    pub count: u32,
    pub radius: f32,
    pub scale_min: f32,
    pub scale_max: f32,
    pub seed_offset: u32,
}

impl Default for SpawnAroundNode {
    fn default() -> Self {
        Self {
            grid_size: 16.0,
            count: 3,
            radius: 8.0,
            scale_min: 0.5,
            scale_max: 1.0,
            seed_offset: 1,
        }
    }
}

impl NodeKind for SpawnAroundNode {
    fn type_name(&self) -> &'static str {
        "SpawnAround"
    }

    fn ports(&self) -> &'static [PortSpec] {
        PORTS
    }

    fn create_processor(&self, node: NodeId) -> Box<dyn NodeProcessor> {
        Box::new(PointsProcessor { node, grid_size: self.grid_size, source: Some("source") })
    }

    fn point_generator(&self) -> Option<&dyn PointGenerator> {
        Some(self)
    }
}

impl PointGenerator for SpawnAroundNode {
    fn grid_size(&self) -> f32 {
        self.grid_size
    }

    fn source_port(&self) -> Option<&'static str> {
        Some("source")
    }

    fn spawn_radius(&self) -> f32 {
        self.radius
    }

    fn generate_cell(&self, cell: IVec2, seed: i32, upstream: Option<&[PointTransform]>) -> Vec<PointTransform> {
        let seed = (seed as u32).wrapping_add(self.seed_offset);
        let mut points = Vec::new();
        for parent in upstream.unwrap_or_default() {
            let parent_hash = parent.hash(seed);
            for k in 0..self.count {
                let [angle, distance, turn, size] = draws::<4>(parent_hash.wrapping_add(k));
                let angle = yaw_from(angle);
                let offset = Vec2::new(angle.cos(), angle.sin()) * distance * self.radius;
                let position = parent.horizontal() + offset;
                if cell_of(position, self.grid_size) != cell {
                    continue;
                }
                let scale = self.scale_min + (self.scale_max - self.scale_min) * size;
                points.push(PointTransform::new(Vec3::new(position.x, 0.0, position.y), yaw_from(turn), scale));
            }
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_split_across_cells_without_duplicates() {
        let node = SpawnAroundNode { grid_size: 4.0, count: 8, radius: 6.0, ..Default::default() };
        let parents = [
            PointTransform::new(Vec3::new(1.0, 0.0, 1.0), 0.0, 1.0),
            PointTransform::new(Vec3::new(-3.0, 0.0, 2.5), 0.0, 1.0),
        ];

        let mut total = 0;
        for y in -4..=4 {
            for x in -4..=4 {
                total += node.generate_cell(IVec2::new(x, y), 11, Some(&parents)).len();
            }
        }
        // The block reaches past every child, so each is placed exactly once
        assert_eq!(total, 16);
    }

    #[test]
    fn test_no_source_no_points() {
        let node = SpawnAroundNode::default();
        assert!(node.generate_cell(IVec2::ZERO, 0, None).is_empty());
    }
}
