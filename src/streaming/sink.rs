//! Renderer-facing chunk interface

use std::collections::HashMap;

use glam::IVec3;

use crate::terrain::chunk_data::ChunkData;
use crate::terrain::config::TerrainConfiguration;

/// Receives chunk visuals from the controller.
///
/// `apply` is called once a chunk's data is ready, `set_enabled` whenever
/// its visibility changes and `clear` when its visuals must go.
pub trait ChunkSink {
    fn apply(&mut self, config: &TerrainConfiguration, data: &ChunkData);

    fn set_enabled(&mut self, config: &TerrainConfiguration, enabled: bool);

    fn clear(&mut self, config: &TerrainConfiguration);
}

/// Visual state of one chunk as seen by a [`RecordingSink`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkEntry {
    pub vertex_count: usize,
    pub enabled: bool,
}

/// Sink that keeps the visual state of every chunk, for tests and tools
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub chunks: HashMap<IVec3, SinkEntry>,
    pub applied: usize,
    pub cleared: usize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_applied(&self, id: IVec3) -> bool {
        self.chunks.contains_key(&id)
    }

    pub fn is_enabled(&self, id: IVec3) -> bool {
        self.chunks.get(&id).is_some_and(|e| e.enabled)
    }

    pub fn enabled(&self) -> impl Iterator<Item = IVec3> + '_ {
        self.chunks.iter().filter(|(_, e)| e.enabled).map(|(id, _)| *id)
    }
}

impl ChunkSink for RecordingSink {
    fn apply(&mut self, config: &TerrainConfiguration, data: &ChunkData) {
        self.applied += 1;
        self.chunks.insert(config.id, SinkEntry { vertex_count: data.vertex_count(), enabled: false });
    }

    fn set_enabled(&mut self, config: &TerrainConfiguration, enabled: bool) {
        if let Some(entry) = self.chunks.get_mut(&config.id) {
            entry.enabled = enabled;
        }
    }

    fn clear(&mut self, config: &TerrainConfiguration) {
        if self.chunks.remove(&config.id).is_some() {
            self.cleared += 1;
        }
    }
}
