use serde::{Deserialize, Serialize};

use super::{fill_map, KernelPhase};
use crate::graph::branch::BranchData;
use crate::graph::node::{NodeId, NodeKind, NodeProcessor};
use crate::graph::port::{PortSpec, ValueKind};
use crate::graph::value::{GraphValue, HeightData, ValueRange};

const PORTS: &[PortSpec] = &[PortSpec::output("height", ValueKind::Height)];

/// A flat height map holding one value
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstantNode {
    pub value: f32,
    /// Lines per side of the produced map
    pub resolution: u32,
}

impl Default for ConstantNode {
    fn default() -> Self {
        Self { value: 0.0, resolution: 1 }
    }
}

impl ConstantNode {
    pub fn new(value: f32) -> Self {
        Self { value, ..Default::default() }
    }
}

impl NodeKind for ConstantNode {
    fn type_name(&self) -> &'static str {
        "Constant"
    }

    fn ports(&self) -> &'static [PortSpec] {
        PORTS
    }

    fn create_processor(&self, node: NodeId) -> Box<dyn NodeProcessor> {
        Box::new(ConstantProcessor {
            node,
            value: self.value,
            resolution: self.resolution.max(1),
            phase: KernelPhase::Idle,
        })
    }
}

struct ConstantProcessor {
    node: NodeId,
    value: f32,
    resolution: u32,
    phase: KernelPhase<HeightData>,
}

impl NodeProcessor for ConstantProcessor {
    fn set_input_values(&mut self, _branch: &mut BranchData<'_>) -> bool {
        true
    }

    fn process(&mut self, branch: &mut BranchData<'_>) -> bool {
        if self.phase.is_idle() {
            let map = branch.allocate_map(self.resolution);
            let Some(view) = branch.map_view(&map) else {
                return false;
            };
            let value = self.value;
            let job = branch.schedule(move || fill_map(&view, |_| value));
            let range = ValueRange::point(value);
            self.phase = KernelPhase::Running(HeightData { map, job, range, local_range: Some(range) });
        }
        self.phase.poll()
    }

    fn cache_output_values(&mut self, branch: &mut BranchData<'_>) {
        if let Some(height) = self.phase.done() {
            branch.publish(self.node, "height", GraphValue::Height(height.clone()));
        }
    }
}
