//! Fractal Brownian motion height source

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use super::{fill_map, store_input, KernelPhase};
use crate::graph::branch::BranchData;
use crate::graph::graph::Amplifier;
use crate::graph::node::{NodeId, NodeKind, NodeProcessor};
use crate::graph::port::{PortSpec, ValueKind};
use crate::graph::value::{GraphValue, GridData, HeightData, ValueRange};

const PORTS: &[PortSpec] = &[
    PortSpec::input("grid", ValueKind::Grid),
    PortSpec::output("height", ValueKind::Height),
];

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseNode {
    /// World distance of one noise period
    pub wavelength: f32,
    /// Heights span base_height +/- amplitude
    pub amplitude: f32,
    pub base_height: f32,
    pub octaves: u32,
    pub persistence: f32,
    pub lacunarity: f32,
    /// Added to the tree seed
    pub seed_offset: u32,
    /// Output has ((grid - 1) / divider) + 1 lines per side
    pub resolution_divider: u32,
}

impl Default for NoiseNode {
    fn default() -> Self {
        Self {
            wavelength: 256.0,
            amplitude: 32.0,
            base_height: 0.0,
            octaves: 5,
            persistence: 0.5,
            lacunarity: 2.0,
            seed_offset: 0,
            resolution_divider: 1,
        }
    }
}

impl NoiseNode {
    /// Bounds every sample of this node falls within
    pub fn static_range(&self) -> ValueRange {
        ValueRange::new(self.base_height - self.amplitude, self.base_height + self.amplitude)
    }
}

/// Output resolution for a grid of `grid_resolution` lines
pub fn divided_resolution(grid_resolution: u32, divider: u32) -> u32 {
    (grid_resolution.max(1) - 1) / divider.max(1) + 1
}

impl NodeKind for NoiseNode {
    fn type_name(&self) -> &'static str {
        "Noise"
    }

    fn ports(&self) -> &'static [PortSpec] {
        PORTS
    }

    fn create_processor(&self, node: NodeId) -> Box<dyn NodeProcessor> {
        Box::new(NoiseProcessor {
            node,
            params: self.clone(),
            grid: None,
            phase: KernelPhase::Idle,
        })
    }

    fn amplify(&self, node: NodeId, amplifier: &mut Amplifier<'_>) {
        amplifier.connect_default_grid(node, "grid");
    }
}

struct NoiseProcessor {
    node: NodeId,
    params: NoiseNode,
    grid: Option<GridData>,
    phase: KernelPhase<HeightData>,
}

impl NodeProcessor for NoiseProcessor {
    fn set_input_values(&mut self, branch: &mut BranchData<'_>) -> bool {
        let pulled = branch.pull_grid(self.node, "grid");
        store_input(&mut self.grid, pulled)
    }

    fn process(&mut self, branch: &mut BranchData<'_>) -> bool {
        if self.phase.is_idle() {
            let Some(grid) = &self.grid else {
                return false;
            };
            let grid_resolution = grid.resolution();
            let resolution = divided_resolution(grid_resolution, self.params.resolution_divider);

            let map = branch.allocate_map(resolution);
            let (Some(xs), Some(zs), Some(target)) =
                (branch.map_view(&grid.x), branch.map_view(&grid.z), branch.map_view(&map))
            else {
                return false;
            };

            let params = self.params.clone();
            let seed = (branch.settings().seed as u32).wrapping_add(params.seed_offset);
            let job = branch.schedule(move || {
                let fbm = Fbm::<Perlin>::new(seed)
                    .set_octaves(params.octaves.max(1) as usize)
                    .set_persistence(params.persistence as f64)
                    .set_lacunarity(params.lacunarity as f64);
                let wavelength = params.wavelength.max(f32::EPSILON) as f64;
                fill_map(&target, |i| {
                    let x = xs.sample(i, resolution) as f64;
                    let z = zs.sample(i, resolution) as f64;
                    let n = fbm.get([x / wavelength, z / wavelength]).clamp(-1.0, 1.0);
                    params.base_height + params.amplitude * n as f32
                });
            });

            let range = self.params.static_range();
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
    fn test_divided_resolution() {
        assert_eq!(divided_resolution(33, 1), 33);
        assert_eq!(divided_resolution(33, 2), 17);
        assert_eq!(divided_resolution(33, 4), 9);
        assert_eq!(divided_resolution(1, 4), 1);
    }

    #[test]
    fn test_static_range() {
        let node = NoiseNode { base_height: 10.0, amplitude: 5.0, ..Default::default() };
        assert_eq!(node.static_range(), ValueRange::new(5.0, 15.0));
    }
}
