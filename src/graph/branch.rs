//! Pull-based node evaluation within one tree
//!
//! A [`BranchData`] is the view a node processor gets of its tree while it
//! runs: the chunk configuration, the compiled graph, engine services and
//! the tree's trunk store. Pulling an input evaluates its producer on demand
//! and memoises the result on the producer's output port.

use crate::awaitable::{JobHandle, JobScheduler};
use crate::core::{DiagnosticKind, Diagnostics, Result};
use crate::pool::{BufferPools, IndexAndResolution, MapView, SharedMapBuffer};
use crate::store::{DataStore, Disposable, TypeStore};
use crate::terrain::config::{EngineConfig, MeshSettings, TerrainConfiguration};

use super::compile::{CompiledGraph, InputLookup};
use super::node::{NodeId, NodeProcessor};
use super::value::{GraphValue, GridData, HeightData, MaskData, PointsData, ValueRange};

/// Engine-wide services shared by every tree
pub struct EngineServices {
    pub pools: BufferPools,
    pub scheduler: JobScheduler,
    pub diagnostics: Diagnostics,
    /// Floats per shared map page
    pub page_size: usize,
    /// Mesh scale of the single-sample trees used to place points on terrain
    pub point_sample_scale: f32,
    /// Maximum polls forced completion may spend on one tree
    pub force_complete_limit: u32,
}

impl EngineServices {
    pub fn new(config: &EngineConfig, diagnostics: Diagnostics) -> Result<Self> {
        Ok(Self {
            pools: BufferPools::new(diagnostics.clone()),
            scheduler: JobScheduler::new(config.worker_threads)?,
            diagnostics,
            page_size: config.page_size,
            point_sample_scale: config.point_sample_scale,
            force_complete_limit: config.force_complete_limit,
        })
    }
}

/// Key of a cached output value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutputKey {
    pub node: NodeId,
    pub port: usize,
}

/// Kernel handles a tree has dispatched and not yet seen finish
#[derive(Debug, Default)]
pub struct PendingWork {
    jobs: Vec<JobHandle>,
    dispatched: usize,
}

impl PendingWork {
    pub fn track(&mut self, job: JobHandle) {
        self.jobs.retain(|j| !j.is_completed());
        self.jobs.push(job);
        self.dispatched += 1;
    }

    /// Handle over every job still running
    pub fn handle(&self) -> JobHandle {
        JobHandle::combine(self.jobs.iter())
    }

    /// Jobs dispatched over the tree's lifetime
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }
}

impl Disposable for PendingWork {
    fn has_pending_work(&self) -> bool {
        self.jobs.iter().any(|j| !j.is_completed())
    }

    fn complete_pending_work(&mut self) {
        for job in self.jobs.drain(..) {
            job.complete();
        }
    }
}

/// Exact value ranges measured for nodes of this tree
pub struct ValueRangeCache {
    ranges: DataStore<NodeId, ValueRange>,
}

impl ValueRangeCache {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self { ranges: DataStore::new("value range", diagnostics) }
    }

    pub fn get(&self, node: NodeId) -> Option<ValueRange> {
        self.ranges.get(&node).copied()
    }

    pub fn record(&mut self, node: NodeId, range: ValueRange) -> bool {
        self.ranges.add_data(node, range)
    }
}

impl Disposable for ValueRangeCache {}

/// Per-tree storage: cached output values plus per-tree services
pub struct TrunkStore {
    pub outputs: DataStore<OutputKey, GraphValue>,
    pub services: TypeStore,
    diagnostics: Diagnostics,
}

impl TrunkStore {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            outputs: DataStore::new("output", diagnostics.clone()),
            services: TypeStore::new(diagnostics.clone()),
            diagnostics,
        }
    }

    pub fn map_view(&self, range: &IndexAndResolution) -> Option<MapView> {
        match self.services.get::<SharedMapBuffer>() {
            Some(buffer) => buffer.view(range),
            None => {
                self.diagnostics.report(
                    DiagnosticKind::MissingEntry,
                    "tree has no map buffer to read from",
                );
                None
            }
        }
    }

    pub fn pending_work(&self) -> JobHandle {
        self.services
            .get::<PendingWork>()
            .map(PendingWork::handle)
            .unwrap_or_default()
    }

    pub fn dispatched(&self) -> usize {
        self.services.get::<PendingWork>().map_or(0, PendingWork::dispatched)
    }
}

impl Disposable for TrunkStore {
    fn has_pending_work(&self) -> bool {
        self.outputs.has_pending_work() || self.services.has_pending_work()
    }

    fn complete_pending_work(&mut self) {
        self.outputs.complete_pending_work();
        self.services.complete_pending_work();
    }

    fn dispose_returned(&mut self, pools: &mut BufferPools) {
        self.outputs.dispose_returned(pools);
        self.services.dispose_returned(pools);
    }
}

/// Evaluation phase of a node within a tree
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Not needed by this tree
    Excluded,
    AwaitingInputs,
    Processing,
    Cached,
}

/// A node's processor and phase within one tree
pub(crate) struct NodeSlot {
    processor: Option<Box<dyn NodeProcessor>>,
    state: SlotState,
}

impl NodeSlot {
    pub(crate) fn new(processor: Box<dyn NodeProcessor>) -> Self {
        Self { processor: Some(processor), state: SlotState::AwaitingInputs }
    }

    pub(crate) fn excluded() -> Self {
        Self { processor: None, state: SlotState::Excluded }
    }

    pub(crate) fn state(&self) -> SlotState {
        self.state
    }
}

/// Outcome of pulling an input
#[derive(Clone, Debug)]
pub enum Pull<T> {
    Ready(T),
    /// Producer still running
    Pending,
    /// Nothing feeds this input
    Unconnected,
}

impl<T> Pull<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Pull::Pending)
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Pull::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// A processor's view of its tree during one evaluation step
pub struct BranchData<'a> {
    config: &'a TerrainConfiguration,
    settings: &'a MeshSettings,
    graph: &'a CompiledGraph,
    services: &'a mut EngineServices,
    trunk: &'a mut TrunkStore,
    slots: &'a mut [NodeSlot],
}

impl<'a> BranchData<'a> {
    pub(crate) fn new(
        config: &'a TerrainConfiguration,
        settings: &'a MeshSettings,
        graph: &'a CompiledGraph,
        services: &'a mut EngineServices,
        trunk: &'a mut TrunkStore,
        slots: &'a mut [NodeSlot],
    ) -> Self {
        Self { config, settings, graph, services, trunk, slots }
    }

    pub fn configuration(&self) -> &TerrainConfiguration {
        self.config
    }

    pub fn settings(&self) -> &MeshSettings {
        self.settings
    }

    pub fn graph(&self) -> &CompiledGraph {
        self.graph
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.services.diagnostics
    }

    /// Drive `node` as far as it can go this step; true once its outputs are cached.
    pub fn evaluate(&mut self, node: NodeId) -> bool {
        let index = node.index();
        let Some(slot) = self.slots.get_mut(index) else {
            self.services.diagnostics.report(
                DiagnosticKind::MissingEntry,
                format!("node {} is not part of the graph", node),
            );
            return false;
        };

        match slot.state {
            SlotState::Cached => return true,
            SlotState::Excluded => {
                self.services.diagnostics.report(
                    DiagnosticKind::MissingEntry,
                    format!("node {} was pulled but is not part of this tree", node),
                );
                return false;
            }
            SlotState::AwaitingInputs | SlotState::Processing => {}
        }

        // A missing processor means this node is already on the call stack
        let Some(mut processor) = slot.processor.take() else {
            self.services.diagnostics.report(
                DiagnosticKind::Cycle,
                format!("node {} re-entered while evaluating", node),
            );
            return false;
        };
        let mut state = slot.state;

        if state == SlotState::AwaitingInputs && processor.set_input_values(self) {
            state = SlotState::Processing;
        }
        if state == SlotState::Processing && processor.process(self) {
            processor.cache_output_values(self);
            state = SlotState::Cached;
        }

        let slot = &mut self.slots[index];
        slot.processor = Some(processor);
        slot.state = state;
        state == SlotState::Cached
    }

    /// Value on the output feeding `node.port`, evaluating the producer as needed
    pub fn pull(&mut self, node: NodeId, port: &str) -> Pull<GraphValue> {
        let source = match self.graph.input_source(node, port) {
            InputLookup::Connected(source) => source,
            InputLookup::Unconnected => return Pull::Unconnected,
            InputLookup::UnknownPort => {
                self.services.diagnostics.report(
                    DiagnosticKind::InvalidNode,
                    format!("node {} pulled unknown input '{}'", node, port),
                );
                return Pull::Unconnected;
            }
        };

        if !self.evaluate(source.node) {
            return Pull::Pending;
        }

        let key = OutputKey { node: source.node, port: source.port };
        match self.trunk.outputs.get_required(&key) {
            Some(value) if value.is_ready() => Pull::Ready(value.clone()),
            _ => Pull::Pending,
        }
    }

    fn pull_as<T>(
        &mut self,
        node: NodeId,
        port: &str,
        extract: impl FnOnce(GraphValue) -> Option<T>,
    ) -> Pull<T> {
        match self.pull(node, port) {
            Pull::Ready(value) => {
                let kind = value.kind();
                match extract(value) {
                    Some(value) => Pull::Ready(value),
                    None => {
                        self.services.diagnostics.report(
                            DiagnosticKind::InvalidNode,
                            format!("node {} input '{}' received {:?}", node, port, kind),
                        );
                        Pull::Pending
                    }
                }
            }
            Pull::Pending => Pull::Pending,
            Pull::Unconnected => Pull::Unconnected,
        }
    }

    pub fn pull_grid(&mut self, node: NodeId, port: &str) -> Pull<GridData> {
        self.pull_as(node, port, |v| match v {
            GraphValue::Grid(grid) => Some(grid),
            _ => None,
        })
    }

    pub fn pull_height(&mut self, node: NodeId, port: &str) -> Pull<HeightData> {
        self.pull_as(node, port, |v| match v {
            GraphValue::Height(height) => Some(height),
            _ => None,
        })
    }

    pub fn pull_mask(&mut self, node: NodeId, port: &str) -> Pull<MaskData> {
        self.pull_as(node, port, |v| match v {
            GraphValue::Mask(mask) => Some(mask),
            _ => None,
        })
    }

    pub fn pull_points(&mut self, node: NodeId, port: &str) -> Pull<PointsData> {
        self.pull_as(node, port, |v| match v {
            GraphValue::Points(points) => Some(points),
            _ => None,
        })
    }

    /// Cache `value` on `node.port`
    pub fn publish(&mut self, node: NodeId, port: &str, value: GraphValue) {
        match self.graph.output_index(node, port) {
            Some(index) => {
                self.trunk.outputs.add_data(OutputKey { node, port: index }, value);
            }
            None => self.services.diagnostics.report(
                DiagnosticKind::InvalidNode,
                format!("node {} published to unknown output '{}'", node, port),
            ),
        }
    }

    /// Reserve a `resolution * resolution` map in this tree's buffer
    pub fn allocate_map(&mut self, resolution: u32) -> IndexAndResolution {
        let page_size = self.services.page_size;
        let diagnostics = self.services.diagnostics.clone();
        let buffer = self
            .trunk
            .services
            .get_or_create(|| SharedMapBuffer::new(page_size, diagnostics));
        buffer.allocate(&mut self.services.pools.maps, resolution)
    }

    pub fn map_view(&self, range: &IndexAndResolution) -> Option<MapView> {
        self.trunk.map_view(range)
    }

    /// Dispatch a kernel and track it against this tree
    pub fn schedule<F>(&mut self, kernel: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let job = self.services.scheduler.schedule(kernel);
        self.trunk
            .services
            .get_or_create(PendingWork::default)
            .track(job.clone());
        job
    }

    pub fn record_range(&mut self, node: NodeId, range: ValueRange) {
        let diagnostics = self.services.diagnostics.clone();
        self.trunk
            .services
            .get_or_create(|| ValueRangeCache::new(diagnostics))
            .record(node, range);
    }

    pub fn recorded_range(&self, node: NodeId) -> Option<ValueRange> {
        self.trunk.services.get::<ValueRangeCache>()?.get(node)
    }
}
