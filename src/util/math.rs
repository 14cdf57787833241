//! Math type re-exports and simulation-specific math utilities.
//!
//! This module re-exports the double precision types from `glam` and provides
//! the bounding box used by the spatial index.

pub use glam::{DVec2, DVec3};

use std::fmt;

/// 3D axis-aligned bounding box with double precision.
#[derive(Clone, Copy, PartialEq)]
pub struct BBox3d {
    pub min: DVec3,
    pub max: DVec3,
}

impl BBox3d {
    /// Empty bounding box (inverted, will expand on first point).
    pub const EMPTY: Self = Self {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    /// Create a new bounding box from min and max points.
    #[inline]
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Check if this box is empty (has no volume).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this box to include a point.
    #[inline]
    pub fn expand_by_point(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Expand this box to include another box.
    #[inline]
    pub fn expand_by_box(&mut self, other: &Self) {
        if !other.is_empty() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    /// Get the center of the box.
    #[inline]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the size (extents) of the box.
    #[inline]
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Slab test of a ray against the box.
    ///
    /// `inv_dir` holds the reciprocal of each non-zero direction component.
    /// A zero component degenerates to a containment check on that axis.
    /// Hits behind the origin (`t_far < 0`) are rejected.
    pub fn intersects_ray(&self, origin: DVec3, dir: DVec3, inv_dir: DVec3) -> bool {
        let mut t_near = f64::NEG_INFINITY;
        let mut t_far = f64::INFINITY;

        for axis in 0..3 {
            let (o, min, max) = (origin[axis], self.min[axis], self.max[axis]);
            if dir[axis] == 0.0 {
                if o < min || o > max {
                    return false;
                }
                continue;
            }

            let mut t1 = (min - o) * inv_dir[axis];
            let mut t2 = (max - o) * inv_dir[axis];
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_near = t_near.max(t1);
            t_far = t_far.min(t2);
            if t_near > t_far || t_far < 0.0 {
                return false;
            }
        }
        true
    }
}

impl Default for BBox3d {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for BBox3d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BBox3d({:?} - {:?})", self.min, self.max)
    }
}

/// Component-wise reciprocal that leaves zero components at zero.
#[inline]
pub fn safe_recip(v: DVec3) -> DVec3 {
    let r = |x: f64| if x == 0.0 { 0.0 } else { 1.0 / x };
    DVec3::new(r(v.x), r(v.y), r(v.z))
}

/// Determinant of the 3x3 matrix with columns `a`, `b`, `c`.
#[inline]
pub fn det33(a: DVec3, b: DVec3, c: DVec3) -> f64 {
    a.dot(b.cross(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox3d() {
        let mut b = BBox3d::EMPTY;
        assert!(b.is_empty());

        b.expand_by_point(DVec3::new(-1.0, -1.0, -1.0));
        b.expand_by_point(DVec3::new(1.0, 1.0, 1.0));

        assert_eq!(b.center(), DVec3::ZERO);
        assert_eq!(b.size(), DVec3::splat(2.0));
    }

    #[test]
    fn test_ray_slab() {
        let b = BBox3d::new(DVec3::ZERO, DVec3::ONE);
        let origin = DVec3::new(0.5, 0.5, -2.0);

        let dir = DVec3::Z;
        assert!(b.intersects_ray(origin, dir, safe_recip(dir)));

        // pointing away
        let dir = -DVec3::Z;
        assert!(!b.intersects_ray(origin, dir, safe_recip(dir)));

        // null x/y components outside the slab
        let outside = DVec3::new(2.0, 0.5, -2.0);
        assert!(!b.intersects_ray(outside, DVec3::Z, safe_recip(DVec3::Z)));
    }

    #[test]
    fn test_ray_from_inside() {
        let b = BBox3d::new(DVec3::ZERO, DVec3::ONE);
        let dir = DVec3::new(1.0, 1.0, 0.0).normalize();
        assert!(b.intersects_ray(DVec3::splat(0.5), dir, safe_recip(dir)));
    }

    #[test]
    fn test_det33() {
        assert_eq!(det33(DVec3::X, DVec3::Y, DVec3::Z), 1.0);
        assert_eq!(det33(DVec3::Y, DVec3::X, DVec3::Z), -1.0);
    }
}
