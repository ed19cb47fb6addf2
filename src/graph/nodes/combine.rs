use serde::{Deserialize, Serialize};

use super::{fill_map, store_input, KernelPhase};
use crate::graph::branch::BranchData;
use crate::graph::node::{NodeId, NodeKind, NodeProcessor};
use crate::graph::port::{PortSpec, ValueKind};
use crate::graph::value::{GraphValue, HeightData, ValueRange};

const PORTS: &[PortSpec] = &[
    PortSpec::input("a", ValueKind::Height),
    PortSpec::input("b", ValueKind::Height),
    PortSpec::output("height", ValueKind::Height),
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombineOp {
    #[default]
    Add,
    Subtract,
    Multiply,
    Min,
    Max,
}

impl CombineOp {
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            CombineOp::Add => a + b,
            CombineOp::Subtract => a - b,
            CombineOp::Multiply => a * b,
            CombineOp::Min => a.min(b),
            CombineOp::Max => a.max(b),
        }
    }

    pub fn apply_range(self, a: &ValueRange, b: &ValueRange) -> ValueRange {
        match self {
            CombineOp::Add => a.add(b),
            CombineOp::Subtract => a.sub(b),
            CombineOp::Multiply => a.mul(b),
            CombineOp::Min => a.min_with(b),
            CombineOp::Max => a.max_with(b),
        }
    }
}

/// Per-sample combination of two height maps.
///
/// The output takes the finer of the two resolutions; the coarser input is
/// sampled at the nearest matching cell.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineNode {
    pub op: CombineOp,
}

impl CombineNode {
    pub fn new(op: CombineOp) -> Self {
        Self { op }
    }
}

impl NodeKind for CombineNode {
    fn type_name(&self) -> &'static str {
        "Combine"
    }

    fn ports(&self) -> &'static [PortSpec] {
        PORTS
    }

    fn create_processor(&self, node: NodeId) -> Box<dyn NodeProcessor> {
        Box::new(CombineProcessor {
            node,
            op: self.op,
            a: None,
            b: None,
            phase: KernelPhase::Idle,
        })
    }
}

struct CombineProcessor {
    node: NodeId,
    op: CombineOp,
    a: Option<HeightData>,
    b: Option<HeightData>,
    phase: KernelPhase<HeightData>,
}

impl NodeProcessor for CombineProcessor {
    fn set_input_values(&mut self, branch: &mut BranchData<'_>) -> bool {
        let a = branch.pull_height(self.node, "a");
        let b = branch.pull_height(self.node, "b");
        // Both inputs are pulled every time so their producers run in parallel
        let a_ready = store_input(&mut self.a, a);
        let b_ready = store_input(&mut self.b, b);
        a_ready && b_ready
    }

    fn process(&mut self, branch: &mut BranchData<'_>) -> bool {
        if self.phase.is_idle() {
            let (Some(a), Some(b)) = (&self.a, &self.b) else {
                return false;
            };
            let resolution = a.map.resolution.max(b.map.resolution);
            let map = branch.allocate_map(resolution);
            let (Some(va), Some(vb), Some(target)) =
                (branch.map_view(&a.map), branch.map_view(&b.map), branch.map_view(&map))
            else {
                return false;
            };

            let op = self.op;
            let job = branch.schedule(move || {
                fill_map(&target, |i| op.apply(va.sample(i, resolution), vb.sample(i, resolution)));
            });
            let range = op.apply_range(&a.best_range(), &b.best_range());
            self.phase = KernelPhase::Running(HeightData { map, job, range, local_range: None });
        }
        self.phase.poll()
    }

    fn cache_output_values(&mut self, branch: &mut BranchData<'_>) {
        if let Some(height) = self.phase.done() {
            branch.publish(self.node, "height", GraphValue::Height(height.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ops() {
        assert_eq!(CombineOp::Add.apply(2.0, 3.0), 5.0);
        assert_eq!(CombineOp::Subtract.apply(2.0, 3.0), -1.0);
        assert_eq!(CombineOp::Multiply.apply(2.0, 3.0), 6.0);
        assert_eq!(CombineOp::Min.apply(2.0, 3.0), 2.0);
        assert_eq!(CombineOp::Max.apply(2.0, 3.0), 3.0);
    }

    #[test]
    fn test_range_follows_op() {
        let a = ValueRange::new(0.0, 1.0);
        let b = ValueRange::new(2.0, 4.0);
        assert_eq!(CombineOp::Add.apply_range(&a, &b), ValueRange::new(2.0, 5.0));
        assert_eq!(CombineOp::Max.apply_range(&a, &b), ValueRange::new(2.0, 4.0));
    }
}
