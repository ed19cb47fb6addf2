//! Chunk identity, per-request mesh settings and engine configuration

use std::hash::{Hash, Hasher};
use std::path::Path;

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::Result;
use crate::core::diagnostics::DEFAULT_DIAGNOSTIC_CAPACITY;
use crate::pool::map_buffer::DEFAULT_PAGE_SIZE;

/// How sample positions relate to world space
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationMode {
    /// Grids sample at world positions around the chunk anchor
    #[default]
    WorldRelative,
    /// Grids sample in the chunk's local frame, ignoring the anchor
    TerrainRelative,
}

/// Identity of one chunk request
///
/// Equality and hashing use `id` only.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TerrainConfiguration {
    /// (x, y, lod); lod 0 is the finest level
    pub id: IVec3,
    /// World-space chunk center
    pub position: Vec3,
    /// Surface up direction
    pub normal: Vec3,
}

impl TerrainConfiguration {
    pub fn new(id: IVec3, position: Vec3) -> Self {
        Self { id, position, normal: Vec3::Y }
    }

    /// Chunk `(x, y)` of a quadtree level whose chunks are `size` wide.
    ///
    /// Chunk squares tile the XZ plane starting at the origin.
    pub fn for_chunk(x: i32, y: i32, lod: u32, size: f32) -> Self {
        let position = Vec3::new((x as f32 + 0.5) * size, 0.0, (y as f32 + 0.5) * size);
        Self::new(IVec3::new(x, y, lod as i32), position)
    }

    pub fn x(&self) -> i32 {
        self.id.x
    }

    pub fn y(&self) -> i32 {
        self.id.y
    }

    pub fn lod(&self) -> u32 {
        self.id.z.max(0) as u32
    }
}

impl PartialEq for TerrainConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TerrainConfiguration {}

impl Hash for TerrainConfiguration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Per-request generation parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    pub seed: i32,
    /// Vertices per side
    pub resolution: u32,
    /// World size of the chunk
    pub mesh_scale: f32,
    /// Mask resolution; `None` uses `resolution`
    pub texture_resolution: Option<u32>,
    pub mode: GenerationMode,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            resolution: 33,
            mesh_scale: 64.0,
            texture_resolution: None,
            mode: GenerationMode::WorldRelative,
        }
    }
}

impl MeshSettings {
    /// Same mesh shape: resolution and scale match
    pub fn soft_eq(&self, other: &MeshSettings) -> bool {
        self.resolution == other.resolution && self.mesh_scale == other.mesh_scale
    }

    pub fn texture_resolution(&self) -> u32 {
        self.texture_resolution.unwrap_or(self.resolution).max(1)
    }
}

/// Engine-wide tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Kernel worker threads (0 = one per core)
    pub worker_threads: usize,
    /// Floats per shared map page
    pub page_size: usize,
    /// Point regions are clamped to this distance from their origin
    pub max_placement_distance: f32,
    /// Mesh scale of the single-sample trees used to place points on terrain
    pub point_sample_scale: f32,
    /// Maximum polls forced completion may spend on one tree
    pub force_complete_limit: u32,
    pub diagnostics_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            page_size: DEFAULT_PAGE_SIZE,
            max_placement_distance: 2048.0,
            point_sample_scale: 0.01,
            force_complete_limit: 10_000,
            diagnostics_capacity: DEFAULT_DIAGNOSTIC_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Quadtree streaming parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Lod of the root chunks
    pub root_lod: u32,
    /// World size of a lod-0 chunk
    pub base_mesh_scale: f32,
    /// Vertices per side at every lod
    pub resolution: u32,
    pub texture_resolution: Option<u32>,
    pub seed: i32,
    pub mode: GenerationMode,
    /// Chunks farther than this from every viewer are disabled
    pub generation_distance: f32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            root_lod: 4,
            base_mesh_scale: 64.0,
            resolution: 33,
            texture_resolution: None,
            seed: 0,
            mode: GenerationMode::WorldRelative,
            generation_distance: 1024.0,
        }
    }
}

impl StreamingConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// World size of a chunk at `lod`
    pub fn chunk_size(&self, lod: u32) -> f32 {
        crate::streaming::lod::chunk_size_at_lod(self.base_mesh_scale, lod)
    }

    /// Mesh settings for a chunk at `lod`
    pub fn settings_for_lod(&self, lod: u32) -> MeshSettings {
        MeshSettings {
            seed: self.seed,
            resolution: self.resolution,
            mesh_scale: self.chunk_size(lod),
            texture_resolution: self.texture_resolution,
            mode: self.mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_configuration_identity_uses_id_only() {
        let a = TerrainConfiguration::new(IVec3::new(1, 2, 0), Vec3::ZERO);
        let b = TerrainConfiguration::new(IVec3::new(1, 2, 0), Vec3::new(5.0, 0.0, 5.0));
        let c = TerrainConfiguration::new(IVec3::new(1, 2, 1), Vec3::ZERO);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_for_chunk_center() {
        let config = TerrainConfiguration::for_chunk(-1, 2, 3, 100.0);
        assert_eq!(config.position, Vec3::new(-50.0, 0.0, 250.0));
        assert_eq!(config.lod(), 3);
        assert_eq!(config.normal, Vec3::Y);
    }

    #[test]
    fn test_soft_eq_ignores_seed_and_mode() {
        let a = MeshSettings { seed: 1, ..Default::default() };
        let b = MeshSettings { seed: 2, mode: GenerationMode::TerrainRelative, ..Default::default() };
        let c = MeshSettings { resolution: 65, ..Default::default() };
        assert!(a.soft_eq(&b));
        assert!(!a.soft_eq(&c));
    }

    #[test]
    fn test_settings_for_lod_doubles_scale() {
        let config = StreamingConfig { base_mesh_scale: 50.0, ..Default::default() };
        assert_eq!(config.settings_for_lod(0).mesh_scale, 50.0);
        assert_eq!(config.settings_for_lod(3).mesh_scale, 400.0);
    }

    #[test]
    fn test_engine_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");

        let config = EngineConfig { worker_threads: 3, page_size: 4096, ..Default::default() };
        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();

        assert_eq!(loaded.worker_threads, 3);
        assert_eq!(loaded.page_size, 4096);
        assert_eq!(loaded.force_complete_limit, config.force_complete_limit);
    }

    #[test]
    fn test_streaming_config_partial_json() {
        let config: StreamingConfig =
            serde_json::from_str(r#"{ "root_lod": 2, "mode": "TerrainRelative" }"#).unwrap();
        assert_eq!(config.root_lod, 2);
        assert_eq!(config.mode, GenerationMode::TerrainRelative);
        assert_eq!(config.base_mesh_scale, StreamingConfig::default().base_mesh_scale);
    }
}
