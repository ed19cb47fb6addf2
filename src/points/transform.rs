//! Placed points, deterministic hashing and cell regions

use std::f32::consts::TAU;

use glam::{IVec2, Mat4, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// One placed object: position, rotation about Y and uniform scale
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointTransform {
    pub position: Vec3,
    pub yaw: f32,
    pub scale: f32,
}

impl PointTransform {
    pub fn new(position: Vec3, yaw: f32, scale: f32) -> Self {
        Self { position, yaw, scale }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            Quat::from_rotation_y(self.yaw),
            self.position,
        )
    }

    pub fn horizontal(&self) -> Vec2 {
        Vec2::new(self.position.x, self.position.z)
    }

    /// Stable hash of the horizontal position
    pub fn hash(&self, seed: u32) -> u32 {
        hash_3d(self.position.x.to_bits() as i32, self.position.z.to_bits() as i32, 0, seed)
    }
}

/// Deterministic 3D integer hash
pub fn hash_3d(x: i32, y: i32, z: i32, seed: u32) -> u32 {
    let mut h = seed;
    h ^= x as u32;
    h = h.wrapping_mul(0x45d9f3b);
    h ^= h >> 16;
    h ^= y as u32;
    h = h.wrapping_mul(0x45d9f3b);
    h ^= h >> 16;
    h ^= z as u32;
    h = h.wrapping_mul(0x45d9f3b);
    h ^= h >> 16;
    h
}

/// Map a hash to [0, 1)
pub fn unit(h: u32) -> f32 {
    (h >> 8) as f32 / (1u32 << 24) as f32
}

/// Random draws derived from one hash, each in [0, 1)
pub(crate) fn draws<const N: usize>(h: u32) -> [f32; N] {
    std::array::from_fn(|i| unit(hash_3d(h as i32, i as i32, 0x5bd1, 0x9e37_79b9)))
}

/// Random yaw in [0, TAU)
pub(crate) fn yaw_from(t: f32) -> f32 {
    t * TAU
}

/// Largest cell radius a region query walks; bounds a query at `(2 * 256 + 1)^2` cells
pub const MAX_CELL_RADIUS: i32 = 256;

/// Cell of a `grid`-sized grid containing `p`.
///
/// Cell `c` covers `[(c - 0.5) * grid, (c + 0.5) * grid)` on each axis.
pub fn cell_of(p: Vec2, grid: f32) -> IVec2 {
    (p / grid + Vec2::splat(0.5)).floor().as_ivec2()
}

/// World-space center of `cell`
pub fn cell_center(cell: IVec2, grid: f32) -> Vec2 {
    cell.as_vec2() * grid
}

/// Square query area around an XZ origin
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointRegion {
    pub origin: Vec2,
    pub size: f32,
}

impl PointRegion {
    pub fn new(origin: Vec2, size: f32) -> Self {
        Self { origin, size }
    }

    /// Region of a chunk anchored at `position`
    pub fn around(position: Vec3, size: f32) -> Self {
        Self::new(Vec2::new(position.x, position.z), size)
    }

    /// Half-open square `[origin - size/2, origin + size/2)`
    pub fn contains(&self, p: Vec3) -> bool {
        let half = self.size * 0.5;
        p.x >= self.origin.x - half
            && p.x < self.origin.x + half
            && p.z >= self.origin.y - half
            && p.z < self.origin.y + half
    }

    /// Cell radius covering this region, capped at `max_distance` and at
    /// [`MAX_CELL_RADIUS`]
    pub fn cell_radius(&self, grid: f32, max_distance: f32) -> i32 {
        let grid = grid.max(f32::EPSILON);
        let wanted = (self.size / (2.0 * grid)).ceil();
        let cap = (max_distance / grid).ceil();
        wanted.min(cap).clamp(0.0, MAX_CELL_RADIUS as f32) as i32
    }

    /// The `(2r + 1)^2` block of cells around the origin's cell, row by row
    pub fn cells(&self, grid: f32, max_distance: f32) -> Vec<IVec2> {
        let center = cell_of(self.origin, grid);
        let r = self.cell_radius(grid, max_distance);
        let mut cells = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
        for dy in -r..=r {
            for dx in -r..=r {
                cells.push(center.saturating_add(IVec2::new(dx, dy)));
            }
        }
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_is_half_open() {
        assert_eq!(unit(0), 0.0);
        assert!(unit(u32::MAX) < 1.0);
    }

    #[test]
    fn test_cell_of_boundaries() {
        assert_eq!(cell_of(Vec2::new(0.0, 0.0), 10.0), IVec2::ZERO);
        assert_eq!(cell_of(Vec2::new(4.9, -4.9), 10.0), IVec2::ZERO);
        assert_eq!(cell_of(Vec2::new(5.0, -5.1), 10.0), IVec2::new(1, -1));
    }

    #[test]
    fn test_region_cells() {
        let region = PointRegion::new(Vec2::new(0.0, 0.0), 40.0);
        let cells = region.cells(10.0, 1000.0);
        assert_eq!(region.cell_radius(10.0, 1000.0), 2);
        assert_eq!(cells.len(), 25);
        assert_eq!(cells[0], IVec2::new(-2, -2));
        assert_eq!(cells[24], IVec2::new(2, 2));
    }

    #[test]
    fn test_region_cells_capped() {
        let region = PointRegion::new(Vec2::ZERO, 1000.0);
        assert_eq!(region.cell_radius(10.0, 25.0), 3);
        assert_eq!(region.cells(10.0, 25.0).len(), 49);
    }

    #[test]
    fn test_cell_radius_is_bounded() {
        let region = PointRegion::new(Vec2::new(3.0e5, -2.0e5), 1.0e6);
        assert_eq!(region.cell_radius(1.0e-9, f32::MAX), MAX_CELL_RADIUS);
        assert_eq!(region.cell_radius(0.0, 1.0e9), MAX_CELL_RADIUS);
        assert_eq!(region.cell_radius(10.0, f32::NAN), MAX_CELL_RADIUS);

        let cells = region.cells(1.0e-9, 1.0e9);
        let side = (2 * MAX_CELL_RADIUS + 1) as usize;
        assert_eq!(cells.len(), side * side);
    }

    #[test]
    fn test_region_contains_half_open() {
        let region = PointRegion::new(Vec2::new(10.0, 10.0), 20.0);
        assert!(region.contains(Vec3::new(0.0, 5.0, 0.0)));
        assert!(!region.contains(Vec3::new(20.0, 0.0, 10.0)));
        assert!(!region.contains(Vec3::new(10.0, 0.0, 20.0)));
    }

    #[test]
    fn test_hash_is_deterministic() {
        let p = PointTransform::new(Vec3::new(1.5, 0.0, -2.0), 0.0, 1.0);
        assert_eq!(p.hash(7), p.hash(7));
        assert_ne!(p.hash(7), p.hash(8));
    }

    #[test]
    fn test_matrix_translation() {
        let p = PointTransform::new(Vec3::new(1.0, 2.0, 3.0), 0.5, 2.0);
        let m = p.to_matrix();
        assert_eq!(m.w_axis.truncate(), Vec3::new(1.0, 2.0, 3.0));
    }
}
