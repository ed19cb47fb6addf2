//! Quadtree chunk controller
//!
//! Each [`ChunkNode`] covers one square of the world. Nodes near a viewer
//! split into four children at the next finer lod; nodes farther away hold
//! a chunk of their own. A node keeps showing its data until every child
//! can cover its square, and a merging node keeps its children until its own
//! data is applied, so the visible set never has holes at a stable tick.

use std::collections::{HashMap, HashSet};

use glam::{IVec2, IVec3, Vec3};

use super::lod::should_split;
use super::sink::ChunkSink;
use crate::math::Aabb;
use crate::terrain::config::{StreamingConfig, TerrainConfiguration};
use crate::terrain::engine::TerrainEngine;

/// Lifecycle of a quadtree node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    Unrequested,
    /// Waiting for the engine to finish the chunk
    Requested,
    /// Chunk data handed to the sink
    VisualsApplied,
    /// Children own the square
    Split,
    /// Out of view; holds nothing
    Disabled,
}

struct Tick<'a> {
    engine: &'a mut TerrainEngine,
    sink: &'a mut dyn ChunkSink,
    viewers: &'a [Vec3],
    generation_distance: f32,
    streaming: &'a StreamingConfig,
}

impl Tick<'_> {
    fn nearest_viewer(&self, bounds: &Aabb) -> f32 {
        self.viewers
            .iter()
            .map(|&v| bounds.horizontal_distance_to(v))
            .fold(f32::INFINITY, f32::min)
    }
}

/// One square of the chunk quadtree
pub struct ChunkNode {
    config: TerrainConfiguration,
    size: f32,
    bounds: Aabb,
    requested: bool,
    applied: bool,
    enabled: bool,
    in_view: bool,
    children: Option<Box<[ChunkNode; 4]>>,
}

impl ChunkNode {
    fn new(x: i32, y: i32, lod: u32, streaming: &StreamingConfig) -> Self {
        let size = streaming.chunk_size(lod);
        let config = TerrainConfiguration::for_chunk(x, y, lod, size);
        Self {
            config,
            size,
            bounds: Aabb::square(config.position, size),
            requested: false,
            applied: false,
            enabled: false,
            in_view: true,
            children: None,
        }
    }

    pub fn config(&self) -> &TerrainConfiguration {
        &self.config
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Visuals currently shown
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn children(&self) -> Option<&[ChunkNode; 4]> {
        self.children.as_deref()
    }

    pub fn state(&self) -> ChunkState {
        if !self.in_view {
            ChunkState::Disabled
        } else if self.children.is_some() && !self.applied {
            ChunkState::Split
        } else if self.applied {
            ChunkState::VisualsApplied
        } else if self.requested {
            ChunkState::Requested
        } else {
            ChunkState::Unrequested
        }
    }

    /// Walk the tree top-down; returns true once the square is covered by applied data
    fn update(&mut self, tick: &mut Tick<'_>, parent_enabled: bool) -> bool {
        let distance = tick.nearest_viewer(&self.bounds);
        self.in_view = distance <= tick.generation_distance;
        if !self.in_view {
            self.destroy(tick);
            // Nothing to show here, so a splitting parent need not wait on it
            return true;
        }

        if self.requested && !self.applied {
            self.apply_if_ready(tick);
        }

        let lod = self.config.lod();
        if should_split(distance, self.size, lod) {
            if self.children.is_none() {
                self.spawn_children(tick.streaming);
            }
            self.set_enabled(tick, parent_enabled && self.applied);

            let children_ready = self.update_children(tick, parent_enabled && !self.applied);
            if children_ready && self.requested {
                self.release_data(tick);
                self.update_children(tick, parent_enabled);
            }
            return children_ready || self.applied;
        }

        if !self.requested {
            let settings = tick.streaming.settings_for_lod(lod);
            tick.engine.request_chunk(self.config, settings);
            self.requested = true;
            self.apply_if_ready(tick);
        }

        if self.applied {
            self.destroy_children(tick);
        } else {
            // Merging: children cover the square until our data arrives
            self.update_children(tick, parent_enabled);
        }
        self.set_enabled(tick, parent_enabled && self.applied);
        self.applied
    }

    fn spawn_children(&mut self, streaming: &StreamingConfig) {
        let (x, y, lod) = (self.config.x(), self.config.y(), self.config.lod() - 1);
        let child = |i: i32| ChunkNode::new(2 * x + (i & 1), 2 * y + (i >> 1), lod, streaming);
        self.children = Some(Box::new([child(0), child(1), child(2), child(3)]));
        log::trace!("Chunk {:?} split", self.config.id);
    }

    fn update_children(&mut self, tick: &mut Tick<'_>, parent_enabled: bool) -> bool {
        let Some(children) = self.children.as_deref_mut() else {
            return true;
        };
        let mut ready = true;
        for child in children.iter_mut() {
            ready &= child.update(tick, parent_enabled);
        }
        ready
    }

    fn apply_if_ready(&mut self, tick: &mut Tick<'_>) {
        if let Some(data) = tick.engine.chunk_data(&self.config) {
            tick.sink.apply(&self.config, data);
            self.applied = true;
        }
    }

    fn set_enabled(&mut self, tick: &mut Tick<'_>, enabled: bool) {
        if self.applied && self.enabled != enabled {
            tick.sink.set_enabled(&self.config, enabled);
        }
        self.enabled = enabled && self.applied;
    }

    /// Unrequest the chunk and clear its visuals
    fn release_data(&mut self, tick: &mut Tick<'_>) {
        if self.applied {
            tick.sink.clear(&self.config);
        }
        if self.requested {
            tick.engine.unrequest_chunk(&self.config);
        }
        self.requested = false;
        self.applied = false;
        self.enabled = false;
    }

    fn destroy_children(&mut self, tick: &mut Tick<'_>) {
        if let Some(mut children) = self.children.take() {
            for child in children.iter_mut() {
                child.destroy(tick);
            }
            log::trace!("Chunk {:?} merged", self.config.id);
        }
    }

    /// Depth-first teardown of this subtree
    fn destroy(&mut self, tick: &mut Tick<'_>) {
        self.destroy_children(tick);
        self.release_data(tick);
    }

    fn visit<'a>(&'a self, out: &mut Vec<&'a ChunkNode>) {
        out.push(self);
        if let Some(children) = self.children() {
            for child in children {
                child.visit(out);
            }
        }
    }
}

/// Owns the quadtree roots around the viewers
pub struct ChunkController {
    config: StreamingConfig,
    roots: HashMap<IVec2, ChunkNode>,
}

impl ChunkController {
    pub fn new(config: StreamingConfig) -> Self {
        log::info!(
            "Chunk controller: root lod {}, root size {}, {} vertices per side",
            config.root_lod,
            config.chunk_size(config.root_lod),
            config.resolution
        );
        Self { config, roots: HashMap::new() }
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Bring the quadtree in line with the viewers.
    ///
    /// Roots within `generation_distance` of a viewer are kept or created and
    /// the rest are destroyed. The engine itself is not polled here.
    pub fn tick(
        &mut self,
        engine: &mut TerrainEngine,
        sink: &mut dyn ChunkSink,
        viewers: &[Vec3],
        generation_distance: f32,
    ) {
        let wanted = self.wanted_roots(viewers, generation_distance);
        let mut tick = Tick { engine, sink, viewers, generation_distance, streaming: &self.config };

        self.roots.retain(|cell, root| {
            if wanted.contains(cell) {
                return true;
            }
            root.destroy(&mut tick);
            false
        });
        for cell in wanted {
            self.roots
                .entry(cell)
                .or_insert_with(|| ChunkNode::new(cell.x, cell.y, self.config.root_lod, &self.config));
        }

        for root in self.roots.values_mut() {
            root.update(&mut tick, true);
        }
    }

    fn wanted_roots(&self, viewers: &[Vec3], generation_distance: f32) -> HashSet<IVec2> {
        let size = self.config.chunk_size(self.config.root_lod);
        let mut wanted = HashSet::new();
        for viewer in viewers {
            let min_x = ((viewer.x - generation_distance) / size).floor() as i32;
            let max_x = ((viewer.x + generation_distance) / size).floor() as i32;
            let min_y = ((viewer.z - generation_distance) / size).floor() as i32;
            let max_y = ((viewer.z + generation_distance) / size).floor() as i32;
            for y in min_y..=max_y {
                for x in min_x..=max_x {
                    let center = Vec3::new((x as f32 + 0.5) * size, 0.0, (y as f32 + 0.5) * size);
                    if Aabb::square(center, size).horizontal_distance_to(*viewer) <= generation_distance {
                        wanted.insert(IVec2::new(x, y));
                    }
                }
            }
        }
        wanted
    }

    /// Destroy every root, releasing all chunk requests and visuals
    pub fn clear(&mut self, engine: &mut TerrainEngine, sink: &mut dyn ChunkSink) {
        let mut tick = Tick { engine, sink, viewers: &[], generation_distance: 0.0, streaming: &self.config };
        for (_, mut root) in self.roots.drain() {
            root.destroy(&mut tick);
        }
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Every node, roots first then depth-first
    pub fn nodes(&self) -> Vec<&ChunkNode> {
        let mut out = Vec::new();
        for root in self.roots.values() {
            root.visit(&mut out);
        }
        out
    }

    pub fn find(&self, id: IVec3) -> Option<&ChunkNode> {
        self.nodes().into_iter().find(|n| n.config.id == id)
    }

    /// Chunks whose visuals are enabled
    pub fn active_chunks(&self) -> Vec<TerrainConfiguration> {
        self.nodes().into_iter().filter(|n| n.enabled).map(|n| n.config).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::graph::NodeGraph;
    use crate::graph::nodes::{ConstantNode, HeightOutputNode};
    use crate::streaming::sink::RecordingSink;
    use crate::terrain::config::EngineConfig;

    fn flat_engine() -> TerrainEngine {
        crate::core::logging::init_for_tests();
        let mut graph = NodeGraph::new();
        let constant = graph.add_node("flat", ConstantNode::new(0.0));
        let output = graph.add_node("output", HeightOutputNode);
        graph.connect(constant, "height", output, "height");
        TerrainEngine::new(graph, EngineConfig { worker_threads: 2, ..Default::default() }).unwrap()
    }

    fn settle(
        controller: &mut ChunkController,
        engine: &mut TerrainEngine,
        sink: &mut RecordingSink,
        viewers: &[Vec3],
        distance: f32,
    ) {
        for _ in 0..32 {
            engine.complete_all();
            controller.tick(engine, sink, viewers, distance);
        }
    }

    fn covering(active: &[TerrainConfiguration], streaming: &StreamingConfig, p: Vec3) -> usize {
        active
            .iter()
            .filter(|c| Aabb::square(c.position, streaming.chunk_size(c.lod())).contains_horizontal(p))
            .count()
    }

    #[test]
    fn test_far_viewer_does_not_split() {
        let streaming = StreamingConfig { root_lod: 1, base_mesh_scale: 500.0, resolution: 5, ..Default::default() };
        let mut engine = flat_engine();
        let mut sink = RecordingSink::new();
        let mut controller = ChunkController::new(streaming);

        // Root (0, 0, 1) spans [0, 1000] in x and z
        let viewers = [Vec3::new(500.0, 0.0, -1100.0)];
        settle(&mut controller, &mut engine, &mut sink, &viewers, 2000.0);

        let root = controller.find(IVec3::new(0, 0, 1)).unwrap();
        assert!(root.children().is_none());
        assert_eq!(root.state(), ChunkState::VisualsApplied);
        assert!(sink.is_enabled(IVec3::new(0, 0, 1)));
    }

    #[test]
    fn test_near_viewer_splits_and_releases_parent() {
        let streaming = StreamingConfig { root_lod: 1, base_mesh_scale: 500.0, resolution: 5, ..Default::default() };
        let mut engine = flat_engine();
        let mut sink = RecordingSink::new();
        let mut controller = ChunkController::new(streaming);
        let parent = IVec3::new(0, 0, 1);

        settle(&mut controller, &mut engine, &mut sink, &[Vec3::new(500.0, 0.0, -1100.0)], 2000.0);
        assert!(sink.is_enabled(parent));

        // Within half the root size: split, parent stays until the children are ready
        let near = [Vec3::new(500.0, 0.0, -100.0)];
        controller.tick(&mut engine, &mut sink, &near, 2000.0);
        let root = controller.find(parent).unwrap();
        let ids: Vec<IVec3> = root.children().unwrap().iter().map(|c| c.config().id).collect();
        assert_eq!(
            ids,
            vec![IVec3::new(0, 0, 0), IVec3::new(1, 0, 0), IVec3::new(0, 1, 0), IVec3::new(1, 1, 0)]
        );
        assert!(sink.is_enabled(parent));
        assert!(engine.is_requested(&root.config));

        settle(&mut controller, &mut engine, &mut sink, &near, 2000.0);
        let root = controller.find(parent).unwrap();
        assert_eq!(root.state(), ChunkState::Split);
        assert!(!sink.is_applied(parent));
        assert!(!engine.is_requested(root.config()));
        for child in root.children().unwrap() {
            assert!(child.children().is_none());
            assert!(sink.is_enabled(child.config().id));
        }
        // Other roots are in view too; only the split root's subtree is checked
        assert_eq!(root.children().unwrap().iter().filter(|c| c.is_enabled()).count(), 4);
        assert!(!root.is_enabled());
        let active = controller.active_chunks();
        assert!(active.iter().all(|c| c.id != parent));
        for child in root.children().unwrap() {
            assert!(active.iter().any(|c| c.id == child.config().id));
        }
    }

    #[test]
    fn test_single_coverage_when_stable() {
        let streaming = StreamingConfig { root_lod: 3, base_mesh_scale: 16.0, resolution: 3, ..Default::default() };
        let mut engine = flat_engine();
        let mut sink = RecordingSink::new();
        let mut controller = ChunkController::new(streaming.clone());

        for viewer in [Vec3::new(10.0, 0.0, 10.0), Vec3::new(200.0, 0.0, -60.0), Vec3::new(90.0, 0.0, 40.0)] {
            settle(&mut controller, &mut engine, &mut sink, &[viewer], 150.0);

            let active = controller.active_chunks();
            assert!(!active.is_empty());
            for dz in -10..10 {
                for dx in -10..10 {
                    let p = viewer + Vec3::new(dx as f32 * 9.5, 0.0, dz as f32 * 9.5);
                    assert_eq!(covering(&active, &streaming, p), 1, "point {:?} near viewer {:?}", p, viewer);
                }
            }

            // Sink agrees with the tree
            let mut enabled: Vec<IVec3> = sink.enabled().collect();
            let mut expected: Vec<IVec3> = active.iter().map(|c| c.id).collect();
            enabled.sort_by_key(|v| (v.x, v.y, v.z));
            expected.sort_by_key(|v| (v.x, v.y, v.z));
            assert_eq!(enabled, expected);
        }
    }

    #[test]
    fn test_viewer_leaving_releases_everything() {
        let streaming = StreamingConfig { root_lod: 2, base_mesh_scale: 32.0, resolution: 3, ..Default::default() };
        let mut engine = flat_engine();
        let mut sink = RecordingSink::new();
        let mut controller = ChunkController::new(streaming);

        settle(&mut controller, &mut engine, &mut sink, &[Vec3::ZERO], 100.0);
        assert!(controller.root_count() > 0);
        assert!(engine.stats().requests > 0);

        settle(&mut controller, &mut engine, &mut sink, &[Vec3::new(10_000.0, 0.0, 0.0)], 100.0);
        assert!(controller.find(IVec3::new(0, 0, 2)).is_none());

        controller.clear(&mut engine, &mut sink);
        assert_eq!(controller.root_count(), 0);
        assert_eq!(engine.stats().requests, 0);
        assert!(sink.chunks.is_empty());
    }
}
