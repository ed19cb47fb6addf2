//! Terrain height at a single point
//!
//! Each sample evaluates a minimal tree anchored at the point: one grid
//! line, a tiny mesh scale, and only the nodes upstream of the height
//! producer. The tree is released as soon as the value has been read.

use glam::{IVec3, Vec3};

use super::manager::PointContext;
use crate::awaitable::Awaitable;
use crate::core::DiagnosticKind;
use crate::graph::compile::InputSource;
use crate::graph::tree::TreeId;
use crate::terrain::config::{GenerationMode, MeshSettings, TerrainConfiguration};

pub struct HeightSample {
    index: usize,
    position: Vec3,
    source: InputSource,
    seed: i32,
    tree: Option<TreeId>,
    result: Option<(usize, f32)>,
}

impl HeightSample {
    /// Sample for point `index`, read from `source`
    pub fn new(index: usize, position: Vec3, source: InputSource, seed: i32) -> Self {
        Self { index, position, source, seed, tree: None, result: None }
    }

    fn configuration(&self) -> TerrainConfiguration {
        let id = IVec3::new(self.position.x.floor() as i32, self.position.z.floor() as i32, 0);
        TerrainConfiguration::new(id, self.position)
    }

    fn read(&self, ctx: &PointContext<'_>, tree: TreeId) -> Option<f32> {
        let port = ctx.graph.output_spec(self.source.node, self.source.port)?.name;
        let tree = ctx.trees.get(tree)?;
        let height = tree.output(ctx.graph, self.source.node, port)?.as_height()?;
        let view = tree.map_view(&height.map)?;
        // Nearest sample to the anchor
        Some(view.sample(0, 1))
    }
}

impl<'c> Awaitable<PointContext<'c>> for HeightSample {
    type Output = (usize, f32);

    fn process_data(&mut self, ctx: &mut PointContext<'c>) -> bool {
        if self.result.is_some() {
            return true;
        }

        let tree = match self.tree {
            Some(tree) => tree,
            None => {
                let settings = MeshSettings {
                    seed: self.seed,
                    resolution: 1,
                    mesh_scale: ctx.services.point_sample_scale,
                    texture_resolution: Some(1),
                    mode: GenerationMode::WorldRelative,
                };
                let tree = ctx.trees.create(
                    ctx.graph,
                    ctx.services,
                    self.configuration(),
                    settings,
                    &[self.source.node],
                );
                self.tree = Some(tree);
                tree
            }
        };

        if !ctx.trees.process(tree, ctx.graph, ctx.services) {
            return false;
        }

        let height = self.read(ctx, tree).unwrap_or_else(|| {
            ctx.services.diagnostics.report(
                DiagnosticKind::MissingEntry,
                format!("height sample at {:?} produced no value", self.position),
            );
            0.0
        });
        ctx.trees.release(tree, &mut ctx.services.pools);
        self.tree = None;
        self.result = Some((self.index, height));
        true
    }

    fn result(&self) -> Option<&(usize, f32)> {
        self.result.as_ref()
    }

    fn take_result(&mut self) -> Option<(usize, f32)> {
        self.result.take()
    }
}
