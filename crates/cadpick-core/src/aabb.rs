//! Axis-aligned bounding boxes.

use glam::{Mat4, Vec3};

use crate::ray::Ray;

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// Creates a box from two corners (in any order).
    #[must_use]
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Creates a box centered at `center` with the given half extents.
    #[must_use]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    /// Smallest box containing all points, or `None` for an empty slice.
    #[must_use]
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let (min, max) = rest
            .iter()
            .fold((*first, *first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Self { min, max })
    }

    /// Box center.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the 8 corners.
    #[must_use]
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Transforms the box by `matrix` and re-fits an axis-aligned box around
    /// the transformed corners.
    #[must_use]
    pub fn transform(&self, matrix: &Mat4) -> Self {
        let corners = self.corners().map(|c| matrix.transform_point3(c));
        let (min, max) = corners[1..]
            .iter()
            .fold((corners[0], corners[0]), |(min, max), p| {
                (min.min(*p), max.max(*p))
            });
        Self { min, max }
    }

    /// Whether `point` lies inside or on the box.
    #[must_use]
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Slab test. Returns the point where the ray enters the box, or the exit
    /// point if the ray starts inside it. `None` if the box is missed or
    /// entirely behind the origin.
    #[must_use]
    pub fn intersect_ray(&self, ray: &Ray) -> Option<Vec3> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.direction[axis];
            if dir == 0.0 {
                if origin < self.min[axis] || origin > self.max[axis] {
                    return None;
                }
                continue;
            }

            let inv_dir = 1.0 / dir;
            let mut t1 = (self.min[axis] - origin) * inv_dir;
            let mut t2 = (self.max[axis] - origin) * inv_dir;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }

        if t_max < 0.0 {
            return None;
        }
        let t = if t_min >= 0.0 { t_min } else { t_max };
        Some(ray.at(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points() {
        assert!(Aabb::from_points(&[]).is_none());
        let aabb = Aabb::from_points(&[Vec3::ONE, Vec3::NEG_ONE, Vec3::new(0.0, 2.0, 0.0)]).unwrap();
        assert_eq!(aabb.min, Vec3::NEG_ONE);
        assert_eq!(aabb.max, Vec3::new(1.0, 2.0, 1.0));
    }

    #[test]
    fn test_transform_translation() {
        let aabb = Aabb::new(Vec3::NEG_ONE, Vec3::ONE);
        let moved = aabb.transform(&Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)));
        assert_eq!(moved.center(), Vec3::new(0.0, 0.0, -5.0));
        assert_eq!(moved.max - moved.min, Vec3::splat(2.0));
    }

    #[test]
    fn test_ray_entry_point() {
        let aabb = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, -5.0), Vec3::ONE);
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        let hit = aabb.intersect_ray(&ray).unwrap();
        assert!((hit.z + 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_ray_from_inside_returns_exit() {
        let aabb = Aabb::new(Vec3::NEG_ONE, Vec3::ONE);
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let hit = aabb.intersect_ray(&ray).unwrap();
        assert!((hit.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_ray_misses() {
        let aabb = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, -5.0), Vec3::ONE);
        assert!(aabb.intersect_ray(&Ray::new(Vec3::ZERO, Vec3::Z)).is_none());
        assert!(aabb
            .intersect_ray(&Ray::new(Vec3::new(3.0, 0.0, 0.0), Vec3::NEG_Z))
            .is_none());
    }
}
