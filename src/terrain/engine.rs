//! Chunk requests, incremental evaluation and point queries

use std::collections::HashMap;
use std::sync::Arc;

use glam::{IVec3, Vec3};

use super::chunk_data::ChunkData;
use super::config::{EngineConfig, MeshSettings, TerrainConfiguration};
use super::export::{ExportRequest, ExportedMap};
use crate::awaitable::JobHandle;
use crate::core::{DiagnosticKind, Diagnostics, Error, Result};
use crate::graph::branch::EngineServices;
use crate::graph::compile::CompiledGraph;
use crate::graph::graph::NodeGraph;
use crate::graph::node::NodeId;
use crate::graph::tree::{TreeId, TreeStore};
use crate::points::{PointBatch, PointContext, PointManager, PointQuery, PointRegion, PointTransform};

#[derive(Clone, Copy, Debug)]
struct ChunkRequest {
    tree: TreeId,
    settings: MeshSettings,
    /// Tree completed but produced no mesh
    failed: bool,
}

/// Snapshot of engine bookkeeping
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub requests: usize,
    pub ready_chunks: usize,
    pub active_trees: usize,
    pub closing_trees: usize,
    pub buffers_checked_out: usize,
    pub buffers_allocated: usize,
    pub point_instances: usize,
    pub kernels_dispatched: u64,
    pub diagnostics: usize,
}

/// Generates chunks from a compiled graph.
///
/// Chunks are requested by configuration, evaluated a little on every
/// [`update`](TerrainEngine::update), and released by unrequesting them.
pub struct TerrainEngine {
    graph: Arc<CompiledGraph>,
    services: EngineServices,
    trees: TreeStore,
    requests: HashMap<TerrainConfiguration, ChunkRequest>,
    chunks: HashMap<TerrainConfiguration, ChunkData>,
    completed: Vec<TerrainConfiguration>,
    points: PointManager,
    max_placement_distance: f32,
}

impl TerrainEngine {
    pub fn new(graph: NodeGraph, config: EngineConfig) -> Result<Self> {
        let diagnostics = Diagnostics::new(config.diagnostics_capacity);
        let graph = Arc::new(graph.compile(&diagnostics));
        if graph.height_output().is_none() {
            log::warn!("Graph has no valid height output; chunk requests will be ignored");
        }
        let services = EngineServices::new(&config, diagnostics.clone())?;
        log::info!(
            "Terrain engine started: {} kernel workers, page size {}",
            services.scheduler.worker_count(),
            services.page_size
        );

        Ok(Self {
            graph,
            services,
            trees: TreeStore::new(diagnostics.clone()),
            requests: HashMap::new(),
            chunks: HashMap::new(),
            completed: Vec::new(),
            points: PointManager::new(diagnostics),
            max_placement_distance: config.max_placement_distance,
        })
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.services.diagnostics
    }

    pub fn trees(&self) -> &TreeStore {
        &self.trees
    }

    pub fn points(&self) -> &PointManager {
        &self.points
    }

    /// Start generating a chunk.
    ///
    /// Requesting a chunk that is already requested with compatible settings
    /// does nothing; incompatible settings replace the old request. Returns
    /// true when a new tree was created.
    pub fn request_chunk(&mut self, config: TerrainConfiguration, settings: MeshSettings) -> bool {
        if let Some(existing) = self.requests.get(&config) {
            if existing.settings.soft_eq(&settings) {
                return false;
            }
            log::debug!("Chunk {:?} re-requested with new settings", config.id);
            self.unrequest_chunk(&config);
        }

        let outputs = self.graph.chunk_outputs();
        if self.graph.height_output().is_none() {
            return false;
        }

        let tree = self.trees.create(&self.graph, &self.services, config, settings, &outputs);
        self.requests.insert(config, ChunkRequest { tree, settings, failed: false });
        true
    }

    /// Drop a request. Safe at any stage; unfinished work is reclaimed once
    /// its kernels finish.
    pub fn unrequest_chunk(&mut self, config: &TerrainConfiguration) -> bool {
        let Some(request) = self.requests.remove(config) else {
            return false;
        };
        self.chunks.remove(config);
        self.completed.retain(|c| c != config);
        self.trees.release(request.tree, &mut self.services.pools);
        true
    }

    pub fn is_requested(&self, config: &TerrainConfiguration) -> bool {
        self.requests.contains_key(config)
    }

    pub fn is_chunk_ready(&self, config: &TerrainConfiguration) -> bool {
        self.chunks.contains_key(config)
    }

    pub fn chunk_data(&self, config: &TerrainConfiguration) -> Option<&ChunkData> {
        self.chunks.get(config)
    }

    /// Hold a chunk's buffers beyond its request; pair with [`release_chunk`](Self::release_chunk)
    pub fn retain_chunk(&mut self, config: &TerrainConfiguration) -> Option<ChunkData> {
        let data = self.chunks.get(config)?.clone();
        self.trees.attach(data.tree).then_some(data)
    }

    pub fn release_chunk(&mut self, data: &ChunkData) {
        self.trees.release(data.tree, &mut self.services.pools);
    }

    /// Poll every unfinished chunk once and reclaim closed trees.
    ///
    /// Returns the number of chunks that became ready.
    pub fn update(&mut self) -> usize {
        let mut ready = 0;
        for (config, request) in self.requests.iter_mut() {
            if request.failed || self.chunks.contains_key(config) {
                continue;
            }
            if !self.trees.process(request.tree, &self.graph, &mut self.services) {
                continue;
            }
            if Self::finish_chunk(&self.graph, &self.trees, &self.services.diagnostics, &mut self.chunks, *config, request) {
                self.completed.push(*config);
                ready += 1;
            }
        }

        let closed = self.trees.poll_closing(&mut self.services.pools);
        if ready > 0 || closed > 0 {
            log::trace!("Update: {} chunks ready, {} trees closed", ready, closed);
        }
        ready
    }

    fn finish_chunk(
        graph: &CompiledGraph,
        trees: &TreeStore,
        diagnostics: &Diagnostics,
        chunks: &mut HashMap<TerrainConfiguration, ChunkData>,
        config: TerrainConfiguration,
        request: &mut ChunkRequest,
    ) -> bool {
        match trees.get(request.tree).and_then(|tree| ChunkData::from_tree(tree, graph)) {
            Some(data) => {
                chunks.insert(config, data);
                true
            }
            None => {
                diagnostics.report(
                    DiagnosticKind::MissingEntry,
                    format!("chunk {:?} completed without a mesh", config.id),
                );
                request.failed = true;
                false
            }
        }
    }

    /// Chunks that became ready since the last call
    pub fn take_completed(&mut self) -> Vec<TerrainConfiguration> {
        std::mem::take(&mut self.completed)
    }

    /// Finish one chunk synchronously
    pub fn force_complete(&mut self, config: &TerrainConfiguration) -> bool {
        if self.chunks.contains_key(config) {
            return true;
        }
        let Some(request) = self.requests.get_mut(config) else {
            return false;
        };
        if request.failed || !self.trees.force_complete(request.tree, &self.graph, &mut self.services) {
            return false;
        }
        let done = Self::finish_chunk(&self.graph, &self.trees, &self.services.diagnostics, &mut self.chunks, *config, request);
        if done {
            self.completed.push(*config);
        }
        done
    }

    /// Finish every outstanding chunk synchronously; returns how many are ready
    pub fn complete_all(&mut self) -> usize {
        let pending: Vec<TerrainConfiguration> = self
            .requests
            .keys()
            .filter(|c| !self.chunks.contains_key(c))
            .copied()
            .collect();
        pending.iter().filter(|c| self.force_complete(c)).count()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            requests: self.requests.len(),
            ready_chunks: self.chunks.len(),
            active_trees: self.trees.active_count(),
            closing_trees: self.trees.closing_count(),
            buffers_checked_out: self.services.pools.maps.checked_out(),
            buffers_allocated: self.services.pools.maps.total_allocated(),
            point_instances: self.points.len(),
            kernels_dispatched: self.services.scheduler.dispatched(),
            diagnostics: self.services.diagnostics.total(),
        }
    }

    /// Every point of `node` inside the chunk square, once all its cells are generated
    pub fn get_all_points_in_mesh(
        &mut self,
        node: NodeId,
        config: &TerrainConfiguration,
        settings: &MeshSettings,
    ) -> Option<Vec<PointTransform>> {
        let id = self.points.instance(&self.graph, node, settings.seed)?;
        let region = PointRegion::around(config.position, settings.mesh_scale);
        let mut ctx = PointContext {
            graph: &self.graph,
            services: &mut self.services,
            trees: &mut self.trees,
            max_placement_distance: self.max_placement_distance,
        };
        let mut points = self.points.get_all_points(id, &region, &mut ctx)?;
        points.retain(|p| region.contains(p.position));
        Some(points)
    }

    /// Points of `node` inside the chunk square from cells finished since `query` last looked
    pub fn get_new_points_in_mesh(
        &mut self,
        node: NodeId,
        config: &TerrainConfiguration,
        settings: &MeshSettings,
        query: &mut PointQuery,
    ) -> PointBatch {
        let Some(id) = self.points.instance(&self.graph, node, settings.seed) else {
            return PointBatch::default();
        };
        let region = PointRegion::around(config.position, settings.mesh_scale);
        let mut ctx = PointContext {
            graph: &self.graph,
            services: &mut self.services,
            trees: &mut self.trees,
            max_placement_distance: self.max_placement_distance,
        };
        let mut batch = self.points.get_new_points(id, &region, query, &mut ctx);
        batch.points.retain(|p| region.contains(p.position));
        batch
    }

    /// Evaluate a map synchronously, outside chunk streaming
    pub fn export_map(&mut self, request: &ExportRequest) -> Result<ExportedMap> {
        let node = match &request.node {
            Some(name) => self
                .graph
                .find(name)
                .ok_or_else(|| Error::Export(format!("no node named '{}'", name)))?,
            None => self
                .graph
                .height_output()
                .ok_or_else(|| Error::Export("graph has no height output".to_string()))?,
        };
        if !self.graph.is_valid(node) {
            return Err(Error::Export(format!("node {} is invalid", node)));
        }
        let port = ["height", "mask"]
            .into_iter()
            .find(|port| self.graph.output_index(node, port).is_some())
            .ok_or_else(|| Error::Export(format!("node {} has no height or mask output", node)))?;

        let resolution = request.resolution.max(1);
        let config = TerrainConfiguration::new(
            IVec3::new(i32::MIN, i32::MIN, 0),
            Vec3::new(request.offset.x, 0.0, request.offset.y),
        );
        let settings = MeshSettings {
            seed: request.seed,
            resolution,
            mesh_scale: request.scale,
            texture_resolution: Some(resolution),
            mode: request.mode,
        };

        let tree = self.trees.create(&self.graph, &self.services, config, settings, &[node]);
        let result = if self.trees.force_complete(tree, &self.graph, &mut self.services) {
            self.read_export(tree, node, port, resolution)
        } else {
            Err(Error::Export(format!("evaluation of node {} stalled", node)))
        };
        self.trees.release(tree, &mut self.services.pools);

        if let Ok(map) = &result {
            log::info!(
                "Exported node {} at {}x{}, scale {}, range {:.2}..{:.2}",
                node,
                resolution,
                resolution,
                request.scale,
                map.range.min,
                map.range.max
            );
        }
        result
    }

    fn read_export(&self, tree: TreeId, node: NodeId, port: &str, resolution: u32) -> Result<ExportedMap> {
        let missing = || Error::Export(format!("node {} produced no '{}' map", node, port));
        let tree = self.trees.get(tree).ok_or_else(missing)?;
        let value = tree.output(&self.graph, node, port).ok_or_else(missing)?;
        let map = match (value.as_height(), value.as_mask()) {
            (Some(height), _) => height.map,
            (None, Some(mask)) => mask.map,
            _ => return Err(missing()),
        };
        let view = tree.map_view(&map).ok_or_else(missing)?;
        let len = (resolution as usize) * (resolution as usize);
        let values = (0..len).map(|i| view.sample(i, resolution)).collect();
        Ok(ExportedMap::new(resolution, values))
    }

    /// Release every tree and pooled buffer, waiting for running kernels
    pub fn shutdown(&mut self) {
        if self.trees.is_empty() && self.services.pools.maps.total_allocated() == 0 {
            return;
        }
        let stats = self.stats();
        self.requests.clear();
        self.chunks.clear();
        self.completed.clear();
        self.trees.dispose_all(&mut self.services.pools);
        self.services.pools.dispose_all(&JobHandle::completed());
        log::info!(
            "Terrain engine shut down: {} trees, {} buffers released, {} kernels run",
            stats.active_trees + stats.closing_trees,
            stats.buffers_allocated,
            stats.kernels_dispatched
        );
    }
}

impl Drop for TerrainEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
