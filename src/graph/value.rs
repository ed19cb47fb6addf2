//! Values cached on node output ports

use crate::awaitable::JobHandle;
use crate::core::types::Vec2;
use crate::pool::{BufferPools, IndexAndResolution};
use crate::store::Disposable;

use super::node::NodeId;
use super::port::ValueKind;

/// Closed interval of map values
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    /// Identity for [`include`](Self::include) and [`union`](Self::union)
    pub const EMPTY: ValueRange = ValueRange { min: f32::INFINITY, max: f32::NEG_INFINITY };

    pub fn new(min: f32, max: f32) -> Self {
        Self { min: min.min(max), max: max.max(min) }
    }

    pub fn point(value: f32) -> Self {
        Self { min: value, max: value }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn span(&self) -> f32 {
        if self.is_empty() { 0.0 } else { self.max - self.min }
    }

    pub fn include(&mut self, value: f32) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn union(&self, other: &ValueRange) -> ValueRange {
        ValueRange { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    pub fn add(&self, other: &ValueRange) -> ValueRange {
        ValueRange { min: self.min + other.min, max: self.max + other.max }
    }

    pub fn sub(&self, other: &ValueRange) -> ValueRange {
        ValueRange { min: self.min - other.max, max: self.max - other.min }
    }

    pub fn mul(&self, other: &ValueRange) -> ValueRange {
        let products = [
            self.min * other.min,
            self.min * other.max,
            self.max * other.min,
            self.max * other.max,
        ];
        products.iter().fold(ValueRange::EMPTY, |mut r, &p| {
            r.include(p);
            r
        })
    }

    pub fn min_with(&self, other: &ValueRange) -> ValueRange {
        ValueRange { min: self.min.min(other.min), max: self.max.min(other.max) }
    }

    pub fn max_with(&self, other: &ValueRange) -> ValueRange {
        ValueRange { min: self.min.max(other.min), max: self.max.max(other.max) }
    }

    /// Map `value` into 0..1 across this range (0 for a degenerate range)
    pub fn normalize(&self, value: f32) -> f32 {
        let span = self.span();
        if span <= f32::EPSILON { 0.0 } else { ((value - self.min) / span).clamp(0.0, 1.0) }
    }
}

/// Sample positions of a square grid
#[derive(Clone, Debug)]
pub struct GridData {
    pub x: IndexAndResolution,
    pub z: IndexAndResolution,
    /// XZ position the local vertex frame is centered on
    pub origin: Vec2,
    pub job: JobHandle,
}

impl GridData {
    pub fn resolution(&self) -> u32 {
        self.x.resolution
    }
}

#[derive(Clone, Debug)]
pub struct HeightData {
    pub map: IndexAndResolution,
    pub job: JobHandle,
    /// Conservative bounds known before the kernel runs
    pub range: ValueRange,
    /// Exact bounds of this map, once measured
    pub local_range: Option<ValueRange>,
}

impl HeightData {
    /// Tightest known bounds
    pub fn best_range(&self) -> ValueRange {
        self.local_range.unwrap_or(self.range)
    }
}

#[derive(Clone, Debug)]
pub struct MaskData {
    pub map: IndexAndResolution,
    pub job: JobHandle,
}

/// Mesh vertex channels in the chunk's local frame
#[derive(Clone, Debug)]
pub struct VertexData {
    pub x: IndexAndResolution,
    pub y: IndexAndResolution,
    pub z: IndexAndResolution,
    pub job: JobHandle,
    /// Exact height bounds of this chunk
    pub local_range: ValueRange,
    /// Static height bounds of the whole terrain
    pub global_range: ValueRange,
}

impl VertexData {
    pub fn resolution(&self) -> u32 {
        self.y.resolution
    }
}

/// Handle to a point generator node, resolved by the point manager
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointsData {
    pub node: NodeId,
    pub seed: i32,
    pub grid_size: f32,
}

/// Value cached on an output port
#[derive(Clone, Debug)]
pub enum GraphValue {
    Grid(GridData),
    Height(HeightData),
    Mask(MaskData),
    Vertices(VertexData),
    Points(PointsData),
}

impl GraphValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            GraphValue::Grid(_) => ValueKind::Grid,
            GraphValue::Height(_) => ValueKind::Height,
            GraphValue::Mask(_) => ValueKind::Mask,
            GraphValue::Vertices(_) => ValueKind::Vertices,
            GraphValue::Points(_) => ValueKind::Points,
        }
    }

    pub fn job(&self) -> Option<&JobHandle> {
        match self {
            GraphValue::Grid(g) => Some(&g.job),
            GraphValue::Height(h) => Some(&h.job),
            GraphValue::Mask(m) => Some(&m.job),
            GraphValue::Vertices(v) => Some(&v.job),
            GraphValue::Points(_) => None,
        }
    }

    /// True once every kernel writing this value has finished
    pub fn is_ready(&self) -> bool {
        self.job().is_none_or(JobHandle::is_completed)
    }

    pub fn as_grid(&self) -> Option<&GridData> {
        match self {
            GraphValue::Grid(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_height(&self) -> Option<&HeightData> {
        match self {
            GraphValue::Height(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_mask(&self) -> Option<&MaskData> {
        match self {
            GraphValue::Mask(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_vertices(&self) -> Option<&VertexData> {
        match self {
            GraphValue::Vertices(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_points(&self) -> Option<&PointsData> {
        match self {
            GraphValue::Points(p) => Some(p),
            _ => None,
        }
    }
}

/// Map ranges are owned by the tree's map buffer; values only carry jobs
impl Disposable for GraphValue {
    fn has_pending_work(&self) -> bool {
        !self.is_ready()
    }

    fn complete_pending_work(&mut self) {
        if let Some(job) = self.job() {
            job.complete();
        }
    }

    fn dispose_returned(&mut self, _pools: &mut BufferPools) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_arithmetic() {
        let a = ValueRange::new(-1.0, 2.0);
        let b = ValueRange::new(3.0, 4.0);

        assert_eq!(a.add(&b), ValueRange::new(2.0, 6.0));
        assert_eq!(a.sub(&b), ValueRange::new(-5.0, -1.0));
        assert_eq!(a.mul(&b), ValueRange::new(-4.0, 8.0));
        assert_eq!(a.min_with(&b), ValueRange::new(-1.0, 2.0));
        assert_eq!(a.max_with(&b), ValueRange::new(3.0, 4.0));
        assert_eq!(a.union(&b), ValueRange::new(-1.0, 4.0));
    }

    #[test]
    fn test_empty_range() {
        let mut range = ValueRange::EMPTY;
        assert!(range.is_empty());
        assert_eq!(range.span(), 0.0);
        range.include(3.0);
        range.include(-2.0);
        assert_eq!(range, ValueRange::new(-2.0, 3.0));
        assert_eq!(range.normalize(0.5), 0.5);
    }

    #[test]
    fn test_points_value_is_always_ready() {
        let value = GraphValue::Points(PointsData { node: NodeId(3), seed: 1, grid_size: 4.0 });
        assert!(value.is_ready());
        assert_eq!(value.kind(), ValueKind::Points);
    }
}
