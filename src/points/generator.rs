use glam::IVec2;

use super::transform::PointTransform;

/// Input port generators read terrain height from
pub const HEIGHT_PORT: &str = "height";

/// Cell-wise point placement implemented by point node kinds.
///
/// `generate_cell` must be a pure function of its arguments so that cells
/// can be computed in any order and cached forever.
pub trait PointGenerator: Send + Sync {
    /// Width of one generation cell
    fn grid_size(&self) -> f32;

    /// Input carrying the points this generator derives from
    fn source_port(&self) -> Option<&'static str> {
        None
    }

    /// Farthest a derived point may land from its source point
    fn spawn_radius(&self) -> f32 {
        0.0
    }

    /// Points of `cell`, at height 0.
    ///
    /// `upstream` holds every source point that could place a point in this
    /// cell, and is `None` for generators without a source.
    fn generate_cell(&self, cell: IVec2, seed: i32, upstream: Option<&[PointTransform]>) -> Vec<PointTransform>;
}
