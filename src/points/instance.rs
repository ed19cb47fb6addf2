//! Per-generator cell caches and cell generation tasks

use std::collections::HashMap;
use std::sync::Arc;

use glam::{IVec2, Vec2};

use super::manager::{PointContext, PointManager};
use super::sampling::HeightSample;
use super::transform::{cell_center, PointRegion, PointTransform};
use crate::awaitable::{Awaitable, AwaitableList};
use crate::graph::compile::InputSource;
use crate::graph::node::{NodeId, NodeKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointInstanceId(pub u32);

impl PointInstanceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Instances are unique per generator node and seed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PointKey {
    pub node: NodeId,
    pub seed: i32,
}

/// What a cell task needs to know about its generator
pub(crate) struct GeneratorInfo {
    pub kind: Arc<dyn NodeKind>,
    pub seed: i32,
    pub grid_size: f32,
    pub previous: Option<PointInstanceId>,
    /// Producer feeding the generator's height input
    pub height_source: Option<InputSource>,
}

/// One generator's output for one seed
pub struct PointInstance {
    key: PointKey,
    grid_size: f32,
    previous: Option<PointInstanceId>,
    info: Option<Arc<GeneratorInfo>>,
    cells: HashMap<IVec2, Arc<[PointTransform]>>,
    pub(crate) tasks: HashMap<IVec2, CellTask>,
    generated: usize,
}

impl PointInstance {
    pub(crate) fn new(key: PointKey, info: GeneratorInfo) -> Self {
        Self {
            key,
            grid_size: info.grid_size,
            previous: info.previous,
            info: Some(Arc::new(info)),
            cells: HashMap::new(),
            tasks: HashMap::new(),
            generated: 0,
        }
    }

    /// An instance serving precomputed cells; missing cells are empty
    pub(crate) fn read_only(
        key: PointKey,
        grid_size: f32,
        cells: HashMap<IVec2, Vec<PointTransform>>,
    ) -> Self {
        Self {
            key,
            grid_size,
            previous: None,
            info: None,
            cells: cells.into_iter().map(|(c, p)| (c, Arc::from(p))).collect(),
            tasks: HashMap::new(),
            generated: 0,
        }
    }

    pub fn key(&self) -> PointKey {
        self.key
    }

    pub fn grid_size(&self) -> f32 {
        self.grid_size
    }

    /// Upstream instance of a derived generator
    pub fn previous(&self) -> Option<PointInstanceId> {
        self.previous
    }

    pub fn is_read_only(&self) -> bool {
        self.info.is_none()
    }

    pub fn cell(&self, cell: IVec2) -> Option<&Arc<[PointTransform]>> {
        self.cells.get(&cell)
    }

    pub fn is_cached(&self, cell: IVec2) -> bool {
        self.cells.contains_key(&cell)
    }

    pub fn cached_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn pending_cells(&self) -> usize {
        self.tasks.len()
    }

    /// Cells generated by this instance so far
    pub fn generated_cells(&self) -> usize {
        self.generated
    }

    /// Start tasks for cells that are neither cached nor in flight
    pub(crate) fn start_tasks(&mut self, cells: &[IVec2]) {
        let Some(info) = &self.info else {
            return;
        };
        for &cell in cells {
            if !self.cells.contains_key(&cell) && !self.tasks.contains_key(&cell) {
                self.tasks.insert(cell, CellTask::new(cell, info.clone()));
            }
        }
    }

    pub(crate) fn store(&mut self, cell: IVec2, points: Arc<[PointTransform]>) {
        if self.cells.insert(cell, points).is_none() {
            self.generated += 1;
        }
    }
}

/// Context a cell task is polled with
pub(crate) struct CellEnv<'e, 'c> {
    pub points: &'e mut PointManager,
    pub ctx: &'e mut PointContext<'c>,
}

enum CellPhase {
    AwaitUpstream,
    Sampling {
        points: Vec<PointTransform>,
        samples: AwaitableList<HeightSample, (usize, f32)>,
    },
    Done(Arc<[PointTransform]>),
}

/// Generation of one cell
pub(crate) struct CellTask {
    cell: IVec2,
    info: Arc<GeneratorInfo>,
    phase: CellPhase,
}

impl CellTask {
    fn new(cell: IVec2, info: Arc<GeneratorInfo>) -> Self {
        Self { cell, info, phase: CellPhase::AwaitUpstream }
    }

    /// Source-point area that can affect this cell
    fn upstream_region(&self) -> PointRegion {
        let radius = self
            .info
            .kind
            .point_generator()
            .map_or(0.0, |g| g.spawn_radius());
        PointRegion::new(cell_center(self.cell, self.info.grid_size), self.info.grid_size + 2.0 * radius)
    }

    fn generate(&self, env: &mut CellEnv<'_, '_>) -> Option<Vec<PointTransform>> {
        let upstream = match self.info.previous {
            Some(previous) => {
                let region = self.upstream_region();
                Some(env.points.get_all_points(previous, &region, env.ctx)?)
            }
            None => None,
        };
        let points = match self.info.kind.point_generator() {
            Some(generator) => generator.generate_cell(self.cell, self.info.seed, upstream.as_deref()),
            None => Vec::new(),
        };
        Some(points)
    }
}

impl<'e, 'c> Awaitable<CellEnv<'e, 'c>> for CellTask {
    type Output = Arc<[PointTransform]>;

    fn process_data(&mut self, env: &mut CellEnv<'e, 'c>) -> bool {
        if let CellPhase::AwaitUpstream = self.phase {
            let Some(points) = self.generate(env) else {
                return false;
            };
            self.phase = match self.info.height_source {
                Some(source) if !points.is_empty() => {
                    let samples = points
                        .iter()
                        .enumerate()
                        .map(|(i, p)| HeightSample::new(i, p.position, source, self.info.seed))
                        .collect();
                    CellPhase::Sampling { points, samples: AwaitableList::new(samples) }
                }
                _ => CellPhase::Done(Arc::from(points)),
            };
        }

        if let CellPhase::Sampling { points, samples } = &mut self.phase {
            if !samples.process_data(&mut *env.ctx) {
                return false;
            }
            let mut points = std::mem::take(points);
            for (i, height) in samples.take_result().unwrap_or_default() {
                if let Some(point) = points.get_mut(i) {
                    point.position.y = height;
                }
            }
            self.phase = CellPhase::Done(Arc::from(points));
        }

        matches!(self.phase, CellPhase::Done(_))
    }

    fn result(&self) -> Option<&Arc<[PointTransform]>> {
        match &self.phase {
            CellPhase::Done(points) => Some(points),
            _ => None,
        }
    }

    fn take_result(&mut self) -> Option<Arc<[PointTransform]>> {
        self.result().cloned()
    }
}

/// Horizontal position helper for generators
pub(crate) fn offset_in_cell(cell: IVec2, grid: f32, u: f32, v: f32) -> Vec2 {
    cell_center(cell, grid) + Vec2::new(u - 0.5, v - 0.5) * grid
}
