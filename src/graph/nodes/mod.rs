//! Built-in node library

pub mod grid;
pub mod constant;
pub mod noise;
pub mod combine;
pub mod extractor;
pub mod output;
pub mod mask;
pub mod scatter;
pub mod spawn_around;

pub use grid::SamplingGridNode;
pub use constant::ConstantNode;
pub use noise::NoiseNode;
pub use combine::{CombineNode, CombineOp};
pub use extractor::MinMaxExtractorNode;
pub use output::{HeightOutputNode, TextureOutputNode};
pub use mask::ThresholdMaskNode;
pub use scatter::ScatterPointsNode;
pub use spawn_around::SpawnAroundNode;

use rayon::prelude::*;

use crate::awaitable::JobHandle;
use crate::pool::MapView;

use super::branch::BranchData;
use super::node::{NodeId, NodeProcessor};
use super::value::{GraphValue, GridData, HeightData, MaskData, PointsData, VertexData};

/// Fill every cell of `target` with `value(index)` across the worker pool
pub(crate) fn fill_map<F>(target: &MapView, value: F)
where
    F: Fn(usize) -> f32 + Send + Sync,
{
    (0..target.len()).into_par_iter().for_each(|i| target.set(i, value(i)));
}

/// Values that carry the job writing them
pub(crate) trait Scheduled: Clone {
    fn job(&self) -> &JobHandle;
}

impl Scheduled for GridData {
    fn job(&self) -> &JobHandle {
        &self.job
    }
}

impl Scheduled for HeightData {
    fn job(&self) -> &JobHandle {
        &self.job
    }
}

impl Scheduled for MaskData {
    fn job(&self) -> &JobHandle {
        &self.job
    }
}

impl Scheduled for VertexData {
    fn job(&self) -> &JobHandle {
        &self.job
    }
}

/// Phase of a processor that runs one kernel producing `T`
pub(crate) enum KernelPhase<T> {
    Idle,
    Running(T),
    Done(T),
}

impl<T: Scheduled> KernelPhase<T> {
    pub(crate) fn is_idle(&self) -> bool {
        matches!(self, KernelPhase::Idle)
    }

    /// Move to `Done` once the kernel has finished; true when done
    pub(crate) fn poll(&mut self) -> bool {
        let finished = match self {
            KernelPhase::Running(data) if data.job().is_completed() => Some(data.clone()),
            _ => None,
        };
        if let Some(data) = finished {
            *self = KernelPhase::Done(data);
        }
        matches!(self, KernelPhase::Done(_))
    }

    pub(crate) fn done(&self) -> Option<&T> {
        match self {
            KernelPhase::Done(data) => Some(data),
            _ => None,
        }
    }
}

/// Store a pulled input; false while it is pending or missing
pub(crate) fn store_input<T>(slot: &mut Option<T>, pulled: super::branch::Pull<T>) -> bool {
    if slot.is_none() {
        *slot = pulled.ready();
    }
    slot.is_some()
}

/// Processor shared by point generators: publishes a handle the point
/// manager resolves, once the optional source input is available
pub(crate) struct PointsProcessor {
    pub node: NodeId,
    pub grid_size: f32,
    pub source: Option<&'static str>,
}

impl NodeProcessor for PointsProcessor {
    fn set_input_values(&mut self, branch: &mut BranchData<'_>) -> bool {
        match self.source {
            Some(port) => !branch.pull_points(self.node, port).is_pending(),
            None => true,
        }
    }

    fn process(&mut self, _branch: &mut BranchData<'_>) -> bool {
        true
    }

    fn cache_output_values(&mut self, branch: &mut BranchData<'_>) {
        let value = PointsData { node: self.node, seed: branch.settings().seed, grid_size: self.grid_size };
        branch.publish(self.node, "points", GraphValue::Points(value));
    }
}
