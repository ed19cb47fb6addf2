//! Axis-aligned bounding box

use crate::core::types::Vec3;

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create AABB from center and half-extents
    pub fn from_center_half_extent(center: Vec3, half_extent: Vec3) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    /// Flat square footprint of `size` centered on `center` (y span collapsed to center.y)
    pub fn square(center: Vec3, size: f32) -> Self {
        let half = size * 0.5;
        Self::from_center_half_extent(center, Vec3::new(half, 0.0, half))
    }

    /// Get center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get size (max - min)
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Half-open XZ containment: min inclusive, max exclusive, y ignored
    pub fn contains_horizontal(&self, p: Vec3) -> bool {
        p.x >= self.min.x && p.x < self.max.x &&
        p.z >= self.min.z && p.z < self.max.z
    }

    /// Same box moved by `offset`
    pub fn translated(&self, offset: Vec3) -> Aabb {
        Aabb {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Distance from `p` to the box measured in the XZ plane only.
    ///
    /// Zero when `p` lies above or below the footprint.
    pub fn horizontal_distance_to(&self, p: Vec3) -> f32 {
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dz = (self.min.z - p.z).max(0.0).max(p.z - self.max.z);
        (dx * dx + dz * dz).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(aabb.center(), Vec3::splat(0.5));
        assert_eq!(aabb.size(), Vec3::ONE);
    }

    #[test]
    fn test_contains_horizontal_half_open() {
        let square = Aabb::square(Vec3::ZERO, 2.0);
        assert!(square.contains_horizontal(Vec3::new(-1.0, 50.0, -1.0)));
        assert!(!square.contains_horizontal(Vec3::new(1.0, 0.0, 0.0)));
        assert!(!square.contains_horizontal(Vec3::new(0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_translated() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE).translated(Vec3::new(10.0, 0.0, -5.0));
        assert_eq!(a.min, Vec3::new(10.0, 0.0, -5.0));
        assert_eq!(a.max, Vec3::new(11.0, 1.0, -4.0));
    }

    #[test]
    fn test_horizontal_distance() {
        let square = Aabb::square(Vec3::ZERO, 10.0);
        // Inside the footprint, height ignored
        assert_eq!(square.horizontal_distance_to(Vec3::new(1.0, 500.0, 2.0)), 0.0);
        // Straight out along x
        assert!((square.horizontal_distance_to(Vec3::new(8.0, 0.0, 0.0)) - 3.0).abs() < 1e-5);
        // Diagonal from the corner
        let d = square.horizontal_distance_to(Vec3::new(8.0, -20.0, 9.0));
        assert!((d - 5.0).abs() < 1e-5);
    }
}
