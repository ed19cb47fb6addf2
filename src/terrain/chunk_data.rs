//! Finished chunk output

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use super::config::{MeshSettings, TerrainConfiguration};
use crate::graph::compile::CompiledGraph;
use crate::graph::tree::{TreeData, TreeId};
use crate::graph::value::ValueRange;
use crate::math::Aabb;
use crate::pool::MapView;

/// Vertex layout for mesh consumers
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    /// Chunk-local position
    pub position: [f32; 3],
    /// Height normalized across the chunk's local range
    pub height01: f32,
}

/// A named mask produced by a texture output node
#[derive(Clone, Debug)]
pub struct TextureLayer {
    pub name: String,
    pub resolution: u32,
    pub values: MapView,
}

/// Mesh, bounds and texture layers of one completed chunk tree.
///
/// The maps stay owned by the tree; a `ChunkData` is only valid while its
/// tree is attached.
#[derive(Clone, Debug)]
pub struct ChunkData {
    pub config: TerrainConfiguration,
    pub settings: MeshSettings,
    pub tree: TreeId,
    resolution: u32,
    x: MapView,
    y: MapView,
    z: MapView,
    /// Exact height bounds of this chunk
    pub local_range: ValueRange,
    /// Static height bounds of the whole terrain
    pub global_range: ValueRange,
    /// Bounds around the chunk anchor
    pub object_bounds: Aabb,
    pub world_bounds: Aabb,
    pub textures: Vec<TextureLayer>,
}

impl ChunkData {
    /// Read the outputs of a completed tree; `None` if the mesh is missing
    pub(crate) fn from_tree(tree: &TreeData, graph: &CompiledGraph) -> Option<Self> {
        let output = graph.height_output()?;
        let vertices = tree.output(graph, output, "vertices")?.as_vertices()?.clone();
        let x = tree.map_view(&vertices.x)?;
        let y = tree.map_view(&vertices.y)?;
        let z = tree.map_view(&vertices.z)?;

        let textures = graph
            .texture_outputs()
            .iter()
            .filter_map(|&node| {
                let mask = tree.output(graph, node, "mask")?.as_mask()?;
                Some(TextureLayer {
                    name: graph.node(node)?.name.clone(),
                    resolution: mask.map.resolution,
                    values: tree.map_view(&mask.map)?,
                })
            })
            .collect();

        let config = *tree.configuration();
        let settings = *tree.settings();
        let object_bounds = object_bounds(settings.mesh_scale, &vertices.local_range);
        Some(Self {
            config,
            settings,
            tree: tree.id(),
            resolution: vertices.resolution(),
            x,
            y,
            z,
            local_range: vertices.local_range,
            global_range: vertices.global_range,
            object_bounds,
            world_bounds: object_bounds.translated(config.position),
            textures,
        })
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn vertex_count(&self) -> usize {
        self.y.len()
    }

    pub fn vertex(&self, index: usize) -> Vec3 {
        Vec3::new(self.x.get(index), self.y.get(index), self.z.get(index))
    }

    pub fn vertices(&self) -> Vec<Vec3> {
        (0..self.vertex_count()).map(|i| self.vertex(i)).collect()
    }

    pub fn heights(&self) -> Vec<f32> {
        self.y.to_vec()
    }

    pub fn gpu_vertices(&self) -> Vec<TerrainVertex> {
        (0..self.vertex_count())
            .map(|i| {
                let v = self.vertex(i);
                TerrainVertex { position: v.to_array(), height01: self.local_range.normalize(v.y) }
            })
            .collect()
    }

    pub fn texture(&self, name: &str) -> Option<&TextureLayer> {
        self.textures.iter().find(|t| t.name == name)
    }
}

/// Chunk footprint of `size` around the anchor, spanning `range` vertically
pub fn object_bounds(size: f32, range: &ValueRange) -> Aabb {
    let half = size * 0.5;
    let (min_y, max_y) = if range.is_empty() { (0.0, 0.0) } else { (range.min, range.max) };
    Aabb::new(Vec3::new(-half, min_y, -half), Vec3::new(half, max_y, half))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_bounds() {
        let bounds = object_bounds(1000.0, &ValueRange::new(-3.0, 12.0));
        assert_eq!(bounds.size(), Vec3::new(1000.0, 15.0, 1000.0));
        assert_eq!(bounds.center().x, 0.0);
    }

    #[test]
    fn test_vertex_is_pod() {
        let v = [TerrainVertex { position: [1.0, 2.0, 3.0], height01: 0.5 }];
        let bytes: &[u8] = bytemuck::cast_slice(&v);
        assert_eq!(bytes.len(), 16);
    }
}
