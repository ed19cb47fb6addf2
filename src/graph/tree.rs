//! Evaluation sessions
//!
//! A [`TreeData`] evaluates the subset of the graph needed for one request
//! (a chunk, an export, a single height sample). Trees are reference
//! counted by their consumers and closed in two stages: once the last
//! consumer detaches the tree stops processing, and its buffers go back to
//! the pool only after every kernel it dispatched has finished.

use std::collections::HashMap;

use crate::awaitable::JobHandle;
use crate::core::{DiagnosticKind, Diagnostics};
use crate::pool::{BufferPools, IndexAndResolution, MapView};
use crate::store::Disposable;
use crate::terrain::config::{MeshSettings, TerrainConfiguration};

use super::branch::{BranchData, EngineServices, NodeSlot, OutputKey, SlotState, TrunkStore, ValueRangeCache};
use super::compile::CompiledGraph;
use super::node::NodeId;
use super::value::{GraphValue, ValueRange};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeState {
    Processing,
    Completed,
    /// Detached by every consumer, waiting for kernels before disposal
    Closing,
}

/// One evaluation session
pub struct TreeData {
    id: TreeId,
    config: TerrainConfiguration,
    settings: MeshSettings,
    outputs: Vec<NodeId>,
    /// Nodes the outputs depend on, in dependency order
    node_set: Vec<NodeId>,
    slots: Vec<NodeSlot>,
    trunk: TrunkStore,
    attached: u32,
    state: TreeState,
    polls: u32,
}

impl TreeData {
    /// Create a tree for `outputs`, attached once
    pub fn new(
        id: TreeId,
        graph: &CompiledGraph,
        services: &EngineServices,
        config: TerrainConfiguration,
        settings: MeshSettings,
        outputs: &[NodeId],
    ) -> Self {
        let valid: Vec<NodeId> = outputs.iter().copied().filter(|&o| graph.is_valid(o)).collect();
        if valid.len() != outputs.len() {
            log::debug!(
                "Tree {:?}: dropped {} invalid outputs",
                id,
                outputs.len() - valid.len()
            );
        }

        let node_set = graph.upstream_of(&valid);
        let mut slots: Vec<NodeSlot> = (0..graph.len()).map(|_| NodeSlot::excluded()).collect();
        for &node in &node_set {
            if let Some(compiled) = graph.node(node) {
                slots[node.index()] = NodeSlot::new(compiled.kind.create_processor(node));
            }
        }

        log::debug!(
            "Tree {:?} created for chunk {:?}: {} nodes, resolution {}",
            id,
            config.id,
            node_set.len(),
            settings.resolution
        );

        Self {
            id,
            config,
            settings,
            outputs: valid,
            node_set,
            slots,
            trunk: TrunkStore::new(services.diagnostics.clone()),
            attached: 1,
            state: TreeState::Processing,
            polls: 0,
        }
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn configuration(&self) -> &TerrainConfiguration {
        &self.config
    }

    pub fn settings(&self) -> &MeshSettings {
        &self.settings
    }

    pub fn state(&self) -> TreeState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == TreeState::Completed
    }

    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    pub fn node_set(&self) -> &[NodeId] {
        &self.node_set
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn attached(&self) -> u32 {
        self.attached
    }

    fn cached_count(&self) -> usize {
        self.slots.iter().filter(|s| s.state() == SlotState::Cached).count()
    }

    /// Advance every node once; true when all outputs are cached.
    ///
    /// A completed tree returns true without doing any work.
    pub fn process(&mut self, graph: &CompiledGraph, services: &mut EngineServices) -> bool {
        match self.state {
            TreeState::Completed => return true,
            TreeState::Closing => return false,
            TreeState::Processing => {}
        }

        {
            let mut branch = BranchData::new(
                &self.config,
                &self.settings,
                graph,
                services,
                &mut self.trunk,
                &mut self.slots,
            );
            for &node in &self.node_set {
                branch.evaluate(node);
            }
        }
        self.polls += 1;

        let done = self
            .outputs
            .iter()
            .all(|o| self.slots[o.index()].state() == SlotState::Cached);
        if done {
            self.state = TreeState::Completed;
            log::debug!("Tree {:?} completed after {} polls", self.id, self.polls);
        } else {
            log::trace!(
                "Tree {:?} poll {}: {}/{} nodes cached",
                self.id,
                self.polls,
                self.cached_count(),
                self.node_set.len()
            );
        }
        done
    }

    /// Poll and wait on kernels until complete.
    ///
    /// Gives up with a `Stalled` diagnostic when a poll neither caches a node
    /// nor dispatches a kernel while nothing is running.
    pub fn force_complete(&mut self, graph: &CompiledGraph, services: &mut EngineServices) -> bool {
        let mut last_progress = None;
        for _ in 0..services.force_complete_limit.max(1) {
            if self.process(graph, services) {
                return true;
            }
            if self.state == TreeState::Closing {
                return false;
            }

            let pending = self.trunk.pending_work();
            let progress = (self.cached_count(), self.trunk.dispatched());
            if pending.is_completed() && last_progress == Some(progress) {
                services.diagnostics.report(
                    DiagnosticKind::Stalled,
                    format!(
                        "tree {:?} for chunk {:?} stopped making progress ({}/{} nodes cached)",
                        self.id,
                        self.config.id,
                        progress.0,
                        self.node_set.len()
                    ),
                );
                return false;
            }
            last_progress = Some(progress);
            pending.complete();
        }

        services.diagnostics.report(
            DiagnosticKind::Stalled,
            format!("tree {:?} hit the forced completion limit", self.id),
        );
        false
    }

    pub fn output(&self, graph: &CompiledGraph, node: NodeId, port: &str) -> Option<&GraphValue> {
        let port = graph.output_index(node, port)?;
        self.trunk.outputs.get(&OutputKey { node, port })
    }

    pub fn map_view(&self, range: &IndexAndResolution) -> Option<MapView> {
        self.trunk.map_view(range)
    }

    /// Exact range measured for `node` in this tree
    pub fn value_range(&self, node: NodeId) -> Option<ValueRange> {
        self.trunk.services.get::<ValueRangeCache>()?.get(node)
    }

    pub fn pending_work(&self) -> JobHandle {
        self.trunk.pending_work()
    }

    pub fn has_pending_work(&self) -> bool {
        self.trunk.has_pending_work()
    }

    pub(crate) fn attach(&mut self) -> u32 {
        self.attached += 1;
        self.attached
    }

    pub(crate) fn detach(&mut self) -> u32 {
        self.attached = self.attached.saturating_sub(1);
        self.attached
    }

    fn begin_close(&mut self) {
        self.state = TreeState::Closing;
    }

    /// Return buffers if no kernel is still running
    fn try_dispose(&mut self, pools: &mut BufferPools) -> bool {
        if !self.trunk.try_dispose(pools) {
            return false;
        }
        self.slots.clear();
        true
    }

    fn dispose(&mut self, pools: &mut BufferPools) {
        self.trunk.dispose(pools);
        self.slots.clear();
    }
}

/// Every live tree, plus trees waiting to be disposed
pub struct TreeStore {
    trees: HashMap<TreeId, TreeData>,
    closing: Vec<TreeId>,
    next_id: u64,
    diagnostics: Diagnostics,
}

impl TreeStore {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            trees: HashMap::new(),
            closing: Vec::new(),
            next_id: 0,
            diagnostics,
        }
    }

    pub fn create(
        &mut self,
        graph: &CompiledGraph,
        services: &EngineServices,
        config: TerrainConfiguration,
        settings: MeshSettings,
        outputs: &[NodeId],
    ) -> TreeId {
        let id = TreeId(self.next_id);
        self.next_id += 1;
        self.trees
            .insert(id, TreeData::new(id, graph, services, config, settings, outputs));
        id
    }

    pub fn get(&self, id: TreeId) -> Option<&TreeData> {
        self.trees.get(&id)
    }

    pub fn get_mut(&mut self, id: TreeId) -> Option<&mut TreeData> {
        self.trees.get_mut(&id)
    }

    pub fn process(&mut self, id: TreeId, graph: &CompiledGraph, services: &mut EngineServices) -> bool {
        self.trees
            .get_mut(&id)
            .is_some_and(|tree| tree.process(graph, services))
    }

    pub fn force_complete(&mut self, id: TreeId, graph: &CompiledGraph, services: &mut EngineServices) -> bool {
        self.trees
            .get_mut(&id)
            .is_some_and(|tree| tree.force_complete(graph, services))
    }

    /// Add a consumer to a live tree
    pub fn attach(&mut self, id: TreeId) -> bool {
        match self.trees.get_mut(&id) {
            Some(tree) if tree.state() != TreeState::Closing => {
                tree.attach();
                true
            }
            _ => false,
        }
    }

    /// Drop a consumer; the last one closes the tree. Returns the remaining count.
    pub fn release(&mut self, id: TreeId, pools: &mut BufferPools) -> u32 {
        let Some(tree) = self.trees.get_mut(&id) else {
            self.diagnostics
                .report(DiagnosticKind::DoubleRelease, format!("tree {:?} released after it closed", id));
            return 0;
        };
        if tree.state() == TreeState::Closing {
            self.diagnostics
                .report(DiagnosticKind::DoubleRelease, format!("tree {:?} released while closing", id));
            return 0;
        }
        let remaining = tree.detach();
        if remaining > 0 {
            return remaining;
        }

        tree.begin_close();
        if tree.try_dispose(pools) {
            self.trees.remove(&id);
            log::debug!("Tree {:?} closed", id);
        } else {
            log::debug!("Tree {:?} closing, waiting on kernels", id);
            self.closing.push(id);
        }
        0
    }

    /// Dispose closing trees whose kernels have finished; returns how many closed
    pub fn poll_closing(&mut self, pools: &mut BufferPools) -> usize {
        let mut closed = 0;
        let trees = &mut self.trees;
        self.closing.retain(|id| {
            let Some(tree) = trees.get_mut(id) else {
                return false;
            };
            if !tree.try_dispose(pools) {
                return true;
            }
            trees.remove(id);
            closed += 1;
            log::debug!("Tree {:?} closed", id);
            false
        });
        closed
    }

    /// Barrier-dispose every tree
    pub fn dispose_all(&mut self, pools: &mut BufferPools) {
        for (_, mut tree) in self.trees.drain() {
            tree.dispose(pools);
        }
        self.closing.clear();
    }

    /// Trees not yet closing
    pub fn active_count(&self) -> usize {
        self.trees.len() - self.closing.len()
    }

    pub fn closing_count(&self) -> usize {
        self.closing.len()
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::graph::NodeGraph;
    use crate::graph::nodes::{ConstantNode, HeightOutputNode, NoiseNode};
    use crate::graph::presets;
    use crate::terrain::config::EngineConfig;
    use glam::{IVec3, Vec3};

    fn setup(graph: NodeGraph) -> (CompiledGraph, EngineServices) {
        let diagnostics = Diagnostics::new(64);
        let compiled = graph.compile(&diagnostics);
        let config = EngineConfig { worker_threads: 2, ..Default::default() };
        (compiled, EngineServices::new(&config, diagnostics).unwrap())
    }

    fn chunk() -> TerrainConfiguration {
        TerrainConfiguration::new(IVec3::ZERO, Vec3::ZERO)
    }

    fn settings() -> MeshSettings {
        MeshSettings { resolution: 17, mesh_scale: 64.0, ..Default::default() }
    }

    #[test]
    fn test_process_is_idempotent_after_completion() {
        let (graph, mut services) = setup(presets::noise_terrain(NoiseNode::default()).0);
        let mut store = TreeStore::new(services.diagnostics.clone());
        let output = graph.height_output().unwrap();
        let id = store.create(&graph, &services, chunk(), settings(), &[output]);

        assert!(store.force_complete(id, &graph, &mut services));
        let tree = store.get(id).unwrap();
        assert!(tree.is_completed());
        let polls = tree.polls();
        let heights = tree
            .map_view(&tree.output(&graph, output, "vertices").unwrap().as_vertices().unwrap().y)
            .unwrap()
            .to_vec();
        let dispatched = services.scheduler.dispatched();

        for _ in 0..3 {
            assert!(store.process(id, &graph, &mut services));
        }
        let tree = store.get(id).unwrap();
        assert_eq!(tree.polls(), polls);
        assert_eq!(services.scheduler.dispatched(), dispatched);
        let again = tree
            .map_view(&tree.output(&graph, output, "vertices").unwrap().as_vertices().unwrap().y)
            .unwrap()
            .to_vec();
        assert_eq!(heights, again);
    }

    #[test]
    fn test_node_set_is_upstream_only() {
        let mut graph = NodeGraph::new();
        let used = graph.add_node("used", ConstantNode::new(1.0));
        let unused = graph.add_node("unused", ConstantNode::new(2.0));
        let output = graph.add_node("output", HeightOutputNode);
        graph.connect(used, "height", output, "height");
        let (graph, mut services) = setup(graph);

        let mut store = TreeStore::new(services.diagnostics.clone());
        let id = store.create(&graph, &services, chunk(), settings(), &[output]);
        assert!(store.force_complete(id, &graph, &mut services));

        let tree = store.get(id).unwrap();
        assert!(tree.node_set().contains(&used));
        assert!(!tree.node_set().contains(&unused));
        assert!(tree.output(&graph, unused, "height").is_none());
        assert!(tree.output(&graph, output, "height").is_some());
    }

    #[test]
    fn test_reference_counted_release() {
        let (graph, mut services) = setup(presets::noise_terrain(NoiseNode::default()).0);
        let mut store = TreeStore::new(services.diagnostics.clone());
        let output = graph.height_output().unwrap();
        let id = store.create(&graph, &services, chunk(), settings(), &[output]);
        assert!(store.force_complete(id, &graph, &mut services));
        assert!(services.pools.maps.checked_out() > 0);

        assert!(store.attach(id));
        assert_eq!(store.get(id).unwrap().attached(), 2);
        assert_eq!(store.release(id, &mut services.pools), 1);
        assert_eq!(store.len(), 1);

        assert_eq!(store.release(id, &mut services.pools), 0);
        assert!(store.is_empty());
        assert_eq!(services.pools.maps.checked_out(), 0);
        assert!(!store.attach(id));
        assert_eq!(services.diagnostics.total(), 0);
    }

    #[test]
    fn test_release_while_running_closes_later() {
        let (graph, mut services) = setup(presets::noise_terrain(NoiseNode::default()).0);
        let mut store = TreeStore::new(services.diagnostics.clone());
        let output = graph.height_output().unwrap();
        let id = store.create(&graph, &services, chunk(), MeshSettings { resolution: 257, ..settings() }, &[output]);

        store.process(id, &graph, &mut services);
        store.release(id, &mut services.pools);
        assert!(!store.process(id, &graph, &mut services));
        assert_eq!(store.active_count(), 0);

        for _ in 0..100_000 {
            store.poll_closing(&mut services.pools);
            if store.is_empty() {
                break;
            }
            std::thread::yield_now();
        }
        assert!(store.is_empty());
        assert_eq!(store.closing_count(), 0);
        assert_eq!(services.pools.maps.checked_out(), 0);
    }

    #[test]
    fn test_invalid_outputs_are_dropped() {
        let mut graph = NodeGraph::new();
        // Output with no height source fails validation
        let output = graph.add_node("output", HeightOutputNode);
        let constant = graph.add_node("constant", ConstantNode::new(3.0));
        let (graph, mut services) = setup(graph);
        assert!(!graph.is_valid(output));

        let mut store = TreeStore::new(services.diagnostics.clone());
        let id = store.create(&graph, &services, chunk(), settings(), &[output, constant]);
        assert_eq!(store.get(id).unwrap().outputs(), &[constant]);
        assert!(store.force_complete(id, &graph, &mut services));
        assert!(services.diagnostics.count(DiagnosticKind::InvalidNode) > 0);
    }
}
