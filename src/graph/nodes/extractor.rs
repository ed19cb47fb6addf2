//! Exact min/max measurement of a height map

use std::sync::Arc;

use rayon::prelude::*;

use super::{store_input, KernelPhase, Scheduled};
use crate::awaitable::JobHandle;
use crate::graph::branch::BranchData;
use crate::graph::node::{NodeId, NodeKind, NodeProcessor};
use crate::graph::port::{PortSpec, ValueKind};
use crate::graph::value::{GraphValue, HeightData, ValueRange};
use crate::pool::{AtomicF32, MapView};

const PORTS: &[PortSpec] = &[
    PortSpec::input("height", ValueKind::Height),
    PortSpec::output("height", ValueKind::Height),
];

/// Passes a height map through, attaching its measured range.
///
/// Inserted ahead of height outputs during amplification. The range is also
/// recorded in the tree's [`ValueRangeCache`](crate::graph::branch::ValueRangeCache).
#[derive(Clone, Copy, Debug, Default)]
pub struct MinMaxExtractorNode;

impl NodeKind for MinMaxExtractorNode {
    fn type_name(&self) -> &'static str {
        "MinMaxExtractor"
    }

    fn ports(&self) -> &'static [PortSpec] {
        PORTS
    }

    fn create_processor(&self, node: NodeId) -> Box<dyn NodeProcessor> {
        Box::new(ExtractorProcessor { node, input: None, phase: KernelPhase::Idle })
    }
}

/// Exact range of every value in `view`
pub fn measure(view: &MapView) -> ValueRange {
    (0..view.len())
        .into_par_iter()
        .fold(|| ValueRange::EMPTY, |mut r, i| {
            r.include(view.get(i));
            r
        })
        .reduce(|| ValueRange::EMPTY, |a, b| a.union(&b))
}

#[derive(Clone)]
struct Measurement {
    min: Arc<AtomicF32>,
    max: Arc<AtomicF32>,
    job: JobHandle,
}

impl Measurement {
    fn range(&self) -> ValueRange {
        ValueRange { min: self.min.load(), max: self.max.load() }
    }
}

impl Scheduled for Measurement {
    fn job(&self) -> &JobHandle {
        &self.job
    }
}

struct ExtractorProcessor {
    node: NodeId,
    input: Option<HeightData>,
    phase: KernelPhase<Measurement>,
}

impl ExtractorProcessor {
    fn output(&self) -> Option<HeightData> {
        let input = self.input.as_ref()?;
        if input.local_range.is_some() {
            return Some(input.clone());
        }
        let measured = self.phase.done()?;
        Some(HeightData {
            map: input.map,
            job: measured.job.clone(),
            range: input.range,
            local_range: Some(measured.range()),
        })
    }
}

impl NodeProcessor for ExtractorProcessor {
    fn set_input_values(&mut self, branch: &mut BranchData<'_>) -> bool {
        let pulled = branch.pull_height(self.node, "height");
        store_input(&mut self.input, pulled)
    }

    fn process(&mut self, branch: &mut BranchData<'_>) -> bool {
        let Some(input) = &self.input else {
            return false;
        };
        if input.local_range.is_some() {
            return true;
        }

        if self.phase.is_idle() {
            let Some(view) = branch.map_view(&input.map) else {
                return false;
            };
            let min = Arc::new(AtomicF32::new(0.0));
            let max = Arc::new(AtomicF32::new(0.0));
            let (kernel_min, kernel_max) = (min.clone(), max.clone());
            let job = branch.schedule(move || {
                let range = measure(&view);
                kernel_min.store(range.min);
                kernel_max.store(range.max);
            });
            self.phase = KernelPhase::Running(Measurement { min, max, job });
        }
        self.phase.poll()
    }

    fn cache_output_values(&mut self, branch: &mut BranchData<'_>) {
        let Some(height) = self.output() else {
            return;
        };
        if let Some(range) = height.local_range {
            branch.record_range(self.node, range);
        }
        branch.publish(self.node, "height", GraphValue::Height(height));
    }
}
