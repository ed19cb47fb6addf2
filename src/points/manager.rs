//! Point instance registry and region queries

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use glam::IVec2;

use super::generator::HEIGHT_PORT;
use super::instance::{CellEnv, GeneratorInfo, PointInstance, PointInstanceId, PointKey};
use super::transform::{PointRegion, PointTransform};
use crate::awaitable::Awaitable;
use crate::core::{DiagnosticKind, Diagnostics};
use crate::graph::branch::EngineServices;
use crate::graph::compile::{CompiledGraph, InputLookup};
use crate::graph::node::NodeId;
use crate::graph::tree::TreeStore;

/// Engine state point generation runs against
pub struct PointContext<'a> {
    pub graph: &'a CompiledGraph,
    pub services: &'a mut EngineServices,
    pub trees: &'a mut TreeStore,
    /// Regions are clamped to this many world units around their origin
    pub max_placement_distance: f32,
}

/// Cursor for incremental queries: remembers which cells were returned
#[derive(Clone, Debug, Default)]
pub struct PointQuery {
    seen: HashSet<IVec2>,
}

impl PointQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen_cells(&self) -> usize {
        self.seen.len()
    }
}

/// Points from cells that finished since the query last looked
#[derive(Clone, Debug, Default)]
pub struct PointBatch {
    pub points: Vec<PointTransform>,
    /// Every cell of the region has now been returned
    pub complete: bool,
}

/// Owns every point instance, keyed by generator node and seed
pub struct PointManager {
    instances: Vec<PointInstance>,
    by_key: HashMap<PointKey, PointInstanceId>,
    diagnostics: Diagnostics,
}

impl PointManager {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self { instances: Vec::new(), by_key: HashMap::new(), diagnostics }
    }

    pub fn get(&self, id: PointInstanceId) -> Option<&PointInstance> {
        self.instances.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Instance for `node` and `seed`, creating it and its upstream chain on first use
    pub fn instance(&mut self, graph: &CompiledGraph, node: NodeId, seed: i32) -> Option<PointInstanceId> {
        let key = PointKey { node, seed };
        if let Some(&id) = self.by_key.get(&key) {
            return Some(id);
        }

        let compiled = graph.node(node)?;
        let Some(generator) = compiled.kind.point_generator() else {
            self.diagnostics.report(
                DiagnosticKind::InvalidNode,
                format!("{} is not a point generator", compiled.name),
            );
            return None;
        };
        if !graph.is_valid(node) {
            self.diagnostics.report(
                DiagnosticKind::InvalidNode,
                format!("point generator {} is invalid", compiled.name),
            );
            return None;
        }

        let previous = match generator.source_port() {
            Some(port) => match graph.input_source(node, port) {
                InputLookup::Connected(source) => Some(self.instance(graph, source.node, seed)?),
                _ => {
                    self.diagnostics.report(
                        DiagnosticKind::MissingEntry,
                        format!("{} has no source points", compiled.name),
                    );
                    return None;
                }
            },
            None => None,
        };
        let height_source = match graph.input_source(node, HEIGHT_PORT) {
            InputLookup::Connected(source) if graph.is_valid(source.node) => Some(source),
            _ => None,
        };

        let info = GeneratorInfo {
            kind: Arc::clone(&compiled.kind),
            seed,
            grid_size: generator.grid_size().max(f32::EPSILON),
            previous,
            height_source,
        };
        log::debug!(
            "Point instance for {} (seed {}): grid {}, upstream {:?}",
            compiled.name,
            seed,
            info.grid_size,
            previous
        );
        Some(self.insert(PointInstance::new(key, info)))
    }

    /// Serve precomputed cells for `node` and `seed`. Replaces any existing instance.
    pub fn register_read_only(
        &mut self,
        node: NodeId,
        seed: i32,
        grid_size: f32,
        cells: HashMap<IVec2, Vec<PointTransform>>,
    ) -> PointInstanceId {
        let key = PointKey { node, seed };
        let instance = PointInstance::read_only(key, grid_size.max(f32::EPSILON), cells);
        match self.by_key.get(&key) {
            Some(&id) => {
                self.instances[id.index()] = instance;
                id
            }
            None => self.insert(instance),
        }
    }

    fn insert(&mut self, instance: PointInstance) -> PointInstanceId {
        let id = PointInstanceId(self.instances.len() as u32);
        self.by_key.insert(instance.key(), id);
        self.instances.push(instance);
        id
    }

    /// Every point of the region's cells, once all of them are generated
    pub fn get_all_points(
        &mut self,
        id: PointInstanceId,
        region: &PointRegion,
        ctx: &mut PointContext<'_>,
    ) -> Option<Vec<PointTransform>> {
        let cells = self.resolve_region(id, region, ctx)?;
        let instance = self.get(id)?;
        if !cells.iter().all(|&c| instance.is_cached(c) || instance.is_read_only()) {
            return None;
        }
        Some(
            cells
                .iter()
                .filter_map(|&c| instance.cell(c))
                .flat_map(|points| points.iter().copied())
                .collect(),
        )
    }

    /// Points of cells finished since `query` last saw them
    pub fn get_new_points(
        &mut self,
        id: PointInstanceId,
        region: &PointRegion,
        query: &mut PointQuery,
        ctx: &mut PointContext<'_>,
    ) -> PointBatch {
        let Some(cells) = self.resolve_region(id, region, ctx) else {
            return PointBatch::default();
        };
        let Some(instance) = self.get(id) else {
            return PointBatch::default();
        };

        let mut batch = PointBatch { points: Vec::new(), complete: true };
        for &cell in &cells {
            if query.seen.contains(&cell) {
                continue;
            }
            match instance.cell(cell) {
                Some(points) => {
                    batch.points.extend(points.iter().copied());
                    query.seen.insert(cell);
                }
                None if instance.is_read_only() => {
                    query.seen.insert(cell);
                }
                None => batch.complete = false,
            }
        }
        batch
    }

    /// Start or poll the tasks of every cell in `region`; returns the cells
    fn resolve_region(
        &mut self,
        id: PointInstanceId,
        region: &PointRegion,
        ctx: &mut PointContext<'_>,
    ) -> Option<Vec<IVec2>> {
        let max_distance = ctx.max_placement_distance;
        let instance = self.instances.get_mut(id.index())?;
        let cells = region.cells(instance.grid_size(), max_distance);
        if instance.is_read_only() {
            return Some(cells);
        }

        instance.start_tasks(&cells);
        let mut tasks = std::mem::take(&mut instance.tasks);

        let mut finished = Vec::new();
        {
            let mut env = CellEnv { points: &mut *self, ctx: &mut *ctx };
            for cell in &cells {
                if let Some(task) = tasks.get_mut(cell) {
                    if task.process_data(&mut env) {
                        if let Some(points) = task.take_result() {
                            finished.push((*cell, points));
                        }
                    }
                }
            }
        }

        let instance = self.instances.get_mut(id.index())?;
        for (cell, points) in finished {
            tasks.remove(&cell);
            instance.store(cell, points);
        }
        instance.tasks.extend(tasks);
        Some(cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::nodes::{ConstantNode, ScatterPointsNode, SpawnAroundNode};
    use crate::graph::NodeGraph;
    use crate::terrain::config::EngineConfig;
    use glam::{Vec2, Vec3};

    struct Fixture {
        graph: CompiledGraph,
        services: EngineServices,
        trees: TreeStore,
        points: PointManager,
    }

    impl Fixture {
        fn new(graph: NodeGraph) -> Self {
            let diagnostics = Diagnostics::default();
            let config = EngineConfig { worker_threads: 2, ..Default::default() };
            Self {
                graph: graph.compile(&diagnostics),
                services: EngineServices::new(&config, diagnostics.clone()).unwrap(),
                trees: TreeStore::new(diagnostics.clone()),
                points: PointManager::new(diagnostics),
            }
        }

        fn all(&mut self, id: PointInstanceId, region: &PointRegion) -> Option<Vec<PointTransform>> {
            let mut ctx = PointContext {
                graph: &self.graph,
                services: &mut self.services,
                trees: &mut self.trees,
                max_placement_distance: 2048.0,
            };
            self.points.get_all_points(id, region, &mut ctx)
        }

        fn new_points(&mut self, id: PointInstanceId, region: &PointRegion, query: &mut PointQuery) -> PointBatch {
            let mut ctx = PointContext {
                graph: &self.graph,
                services: &mut self.services,
                trees: &mut self.trees,
                max_placement_distance: 2048.0,
            };
            self.points.get_new_points(id, region, query, &mut ctx)
        }

        fn all_blocking(&mut self, id: PointInstanceId, region: &PointRegion) -> Vec<PointTransform> {
            for _ in 0..10_000 {
                if let Some(points) = self.all(id, region) {
                    return points;
                }
                std::thread::yield_now();
            }
            panic!("region never completed");
        }
    }

    fn scatter_graph(with_height: bool) -> (NodeGraph, NodeId) {
        let mut graph = NodeGraph::new();
        let scatter = graph.add_node(
            "scatter",
            ScatterPointsNode { grid_size: 10.0, points_per_cell: 2, ..Default::default() },
        );
        if with_height {
            let ground = graph.add_node("ground", ConstantNode::new(7.5));
            graph.connect(ground, "height", scatter, "height");
        }
        (graph, scatter)
    }

    #[test]
    fn test_points_without_height_complete_immediately() {
        let (graph, scatter) = scatter_graph(false);
        let mut fixture = Fixture::new(graph);
        let id = fixture.points.instance(&fixture.graph, scatter, 1).unwrap();

        let region = PointRegion::new(Vec2::ZERO, 30.0);
        let points = fixture.all(id, &region).unwrap();
        // 2 cells each way around the center cell
        assert_eq!(points.len(), 25 * 2);
        assert!(points.iter().all(|p| p.position.y == 0.0));
    }

    #[test]
    fn test_cells_are_cached() {
        let (graph, scatter) = scatter_graph(false);
        let mut fixture = Fixture::new(graph);
        let id = fixture.points.instance(&fixture.graph, scatter, 1).unwrap();
        let region = PointRegion::new(Vec2::new(3.0, -4.0), 20.0);

        let first = fixture.all(id, &region).unwrap();
        let generated = fixture.points.get(id).unwrap().generated_cells();
        let second = fixture.all(id, &region).unwrap();

        assert_eq!(first, second);
        assert_eq!(fixture.points.get(id).unwrap().generated_cells(), generated);
    }

    #[test]
    fn test_instances_keyed_by_seed() {
        let (graph, scatter) = scatter_graph(false);
        let mut fixture = Fixture::new(graph);
        let a = fixture.points.instance(&fixture.graph, scatter, 1).unwrap();
        let b = fixture.points.instance(&fixture.graph, scatter, 2).unwrap();
        assert_ne!(a, b);
        assert_eq!(fixture.points.instance(&fixture.graph, scatter, 1), Some(a));
    }

    #[test]
    fn test_height_sampled_at_points() {
        let (graph, scatter) = scatter_graph(true);
        let mut fixture = Fixture::new(graph);
        let id = fixture.points.instance(&fixture.graph, scatter, 0).unwrap();

        let region = PointRegion::new(Vec2::ZERO, 10.0);
        let points = fixture.all_blocking(id, &region);
        assert!(!points.is_empty());
        assert!(points.iter().all(|p| p.position.y == 7.5));

        // Mini trees are released once read
        for _ in 0..10_000 {
            fixture.trees.poll_closing(&mut fixture.services.pools);
            if fixture.trees.is_empty() {
                break;
            }
            std::thread::yield_now();
        }
        assert!(fixture.trees.is_empty());
    }

    #[test]
    fn test_new_points_batches_partition_all_points() {
        let (graph, scatter) = scatter_graph(true);
        let mut fixture = Fixture::new(graph);
        let id = fixture.points.instance(&fixture.graph, scatter, 3).unwrap();
        let region = PointRegion::new(Vec2::new(12.0, 7.0), 25.0);

        let mut query = PointQuery::new();
        let mut collected = Vec::new();
        let mut complete = false;
        for _ in 0..10_000 {
            let batch = fixture.new_points(id, &region, &mut query);
            collected.extend(batch.points);
            if batch.complete {
                complete = true;
                break;
            }
            std::thread::yield_now();
        }
        assert!(complete);

        let all = fixture.all(id, &region).unwrap();
        assert_eq!(collected.len(), all.len());
        for p in &all {
            assert_eq!(collected.iter().filter(|q| *q == p).count(), 1);
        }

        // Nothing new once complete
        let again = fixture.new_points(id, &region, &mut query);
        assert!(again.points.is_empty());
        assert!(again.complete);
    }

    #[test]
    fn test_spawn_around_links_upstream() {
        let mut graph = NodeGraph::new();
        let parents = graph.add_node(
            "parents",
            ScatterPointsNode { grid_size: 20.0, points_per_cell: 1, ..Default::default() },
        );
        let children = graph.add_node(
            "children",
            SpawnAroundNode { grid_size: 10.0, count: 3, radius: 6.0, ..Default::default() },
        );
        graph.connect(parents, "points", children, "source");

        let mut fixture = Fixture::new(graph);
        let id = fixture.points.instance(&fixture.graph, children, 5).unwrap();
        let upstream = fixture.points.get(id).unwrap().previous().unwrap();
        assert_eq!(fixture.points.get(upstream).unwrap().key().node, parents);

        let region = PointRegion::new(Vec2::ZERO, 40.0);
        let points = fixture.all_blocking(id, &region);

        // Every child lies within the spawn radius of some parent
        let parent_points = fixture.all_blocking(upstream, &PointRegion::new(Vec2::ZERO, 100.0));
        for child in &points {
            assert!(parent_points
                .iter()
                .any(|p| p.horizontal().distance(child.horizontal()) <= 6.0 + 1e-3));
        }
    }

    #[test]
    fn test_read_only_missing_cells_are_empty() {
        let (graph, scatter) = scatter_graph(false);
        let mut fixture = Fixture::new(graph);
        let mut cells = HashMap::new();
        cells.insert(IVec2::ZERO, vec![PointTransform::new(Vec3::new(1.0, 2.0, 3.0), 0.0, 1.0)]);
        let id = fixture.points.register_read_only(scatter, 9, 10.0, cells);

        let region = PointRegion::new(Vec2::ZERO, 50.0);
        let first = fixture.all(id, &region).unwrap();
        assert_eq!(first.len(), 1);
        let second = fixture.all(id, &region).unwrap();
        assert_eq!(first, second);

        let instance = fixture.points.get(id).unwrap();
        assert_eq!(instance.generated_cells(), 0);
        assert_eq!(instance.pending_cells(), 0);
        assert_eq!(fixture.services.diagnostics.total(), 0);
    }
}
