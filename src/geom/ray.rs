//! Ray casting infrastructure.
//!
//! A ray is an origin with a unit direction. Intersection tests against
//! scene geometry live in [`crate::geom::triangles`] and are accelerated by
//! [`crate::sim::index::SpatialIndex`].

use crate::{Point, Vector};

/// A ray defined by an origin point and a direction vector.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Origin point of the ray
    pub origin: Point,
    /// Unit direction vector
    pub direction: Vector,
}

impl Ray {
    /// Creates a new ray from origin point and direction vector.
    ///
    /// The direction vector is automatically normalized.
    pub fn new(origin: Point, direction: Vector) -> Option<Self> {
        let normalized = direction.normalize()?;
        Some(Self {
            origin,
            direction: normalized,
        })
    }

    /// Creates a ray from two points (origin to target).
    pub fn from_points(origin: Point, target: Point) -> Option<Self> {
        Self::new(origin, target - origin)
    }

    /// Returns the point along the ray at parameter t.
    ///
    /// point = origin + t * direction
    pub fn point_at(&self, t: f64) -> Point {
        self.origin + self.direction * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_creation() {
        let ray = Ray::new(Point::new(0.0, 0.0, 0.0), Vector::new(2.0, 0.0, 0.0));
        assert!(ray.is_some());
        assert!((ray.unwrap().direction.length() - 1.0).abs() < 1e-12);

        // Zero direction should fail
        let ray = Ray::new(Point::new(0.0, 0.0, 0.0), Vector::new(0.0, 0.0, 0.0));
        assert!(ray.is_none());
    }

    #[test]
    fn test_ray_from_points() {
        let ray = Ray::from_points(Point::new(0.0, 0.0, 0.0), Point::new(1.0, 1.0, 1.0));
        assert!(ray.is_some());
        let ray = Ray::from_points(Point::new(1.0, 1.0, 1.0), Point::new(1.0, 1.0, 1.0));
        assert!(ray.is_none());
    }

    #[test]
    fn test_ray_point_at() {
        let ray = Ray::new(Point::new(0.0, 0.0, 0.0), Vector::new(1.0, 0.0, 0.0)).unwrap();
        let p = ray.point_at(5.0);
        assert!(p.is_close(&Point::new(5.0, 0.0, 0.0)));
    }
}
