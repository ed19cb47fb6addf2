use serde::{Deserialize, Serialize};

use super::{fill_map, store_input, KernelPhase};
use crate::graph::branch::BranchData;
use crate::graph::node::{NodeId, NodeKind, NodeProcessor};
use crate::graph::port::{PortSpec, ValueKind};
use crate::graph::value::{GraphValue, HeightData, MaskData};

const PORTS: &[PortSpec] = &[
    PortSpec::input("height", ValueKind::Height),
    PortSpec::output("mask", ValueKind::Mask),
];

/// Mask that is 1 where height lies in `[min, max]`, fading to 0 over
/// `falloff` outside it. Produced at the tree's texture resolution.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdMaskNode {
    pub min: f32,
    pub max: f32,
    pub falloff: f32,
}

impl Default for ThresholdMaskNode {
    fn default() -> Self {
        Self { min: 0.0, max: f32::MAX, falloff: 0.0 }
    }
}

impl ThresholdMaskNode {
    pub fn weight(&self, height: f32) -> f32 {
        let outside = if height < self.min {
            self.min - height
        } else if height > self.max {
            height - self.max
        } else {
            return 1.0;
        };
        if self.falloff <= 0.0 {
            0.0
        } else {
            (1.0 - outside / self.falloff).max(0.0)
        }
    }
}

impl NodeKind for ThresholdMaskNode {
    fn type_name(&self) -> &'static str {
        "ThresholdMask"
    }

    fn ports(&self) -> &'static [PortSpec] {
        PORTS
    }

    fn create_processor(&self, node: NodeId) -> Box<dyn NodeProcessor> {
        Box::new(MaskProcessor { node, params: self.clone(), height: None, phase: KernelPhase::Idle })
    }
}

struct MaskProcessor {
    node: NodeId,
    params: ThresholdMaskNode,
    height: Option<HeightData>,
    phase: KernelPhase<MaskData>,
}

impl NodeProcessor for MaskProcessor {
    fn set_input_values(&mut self, branch: &mut BranchData<'_>) -> bool {
        let pulled = branch.pull_height(self.node, "height");
        store_input(&mut self.height, pulled)
    }

    fn process(&mut self, branch: &mut BranchData<'_>) -> bool {
        if self.phase.is_idle() {
            let Some(height) = &self.height else {
                return false;
            };
            let resolution = branch.settings().texture_resolution();
            let map = branch.allocate_map(resolution);
            let (Some(source), Some(target)) = (branch.map_view(&height.map), branch.map_view(&map)) else {
                return false;
            };
            let params = self.params.clone();
            let job = branch.schedule(move || {
                fill_map(&target, |i| params.weight(source.sample(i, resolution)));
            });
            self.phase = KernelPhase::Running(MaskData { map, job });
        }
        self.phase.poll()
    }

    fn cache_output_values(&mut self, branch: &mut BranchData<'_>) {
        if let Some(mask) = self.phase.done() {
            branch.publish(self.node, "mask", GraphValue::Mask(mask.clone()));
        }
    }
}
