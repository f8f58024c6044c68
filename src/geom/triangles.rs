use crate::geom::EPS;
use crate::geom::ray::Ray;
use crate::{Point, Vector};

/// Hits closer than this to the ray origin are ignored.
pub const MIN_HIT_DISTANCE: f64 = 1e-9;

/// Barycentric margin below which a hit counts as lying on an edge or vertex.
const DEGENERATE_MARGIN: f64 = 1e-7;

/// Ray/triangle hit in terms of the ray parameter and barycentric coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    /// Distance along the (unit) ray direction.
    pub t: f64,
    pub u: f64,
    pub v: f64,
}

impl TriangleHit {
    /// True if the hit lies (numerically) on an edge or a vertex of the triangle.
    pub fn is_degenerate(&self) -> bool {
        self.u < DEGENERATE_MARGIN
            || self.v < DEGENERATE_MARGIN
            || 1.0 - self.u - self.v < DEGENERATE_MARGIN
    }
}

/// Unit normal of the triangle, following the vertex winding.
pub fn triangle_normal(tri: &[Point; 3]) -> Option<Vector> {
    Vector::normal(tri[0], tri[1], tri[2])
}

/// Moller-Trumbore ray/triangle intersection.
///
/// Returns `None` for misses, rays parallel to the triangle plane,
/// and hits behind or too close to the origin.
pub fn intersect_triangle(ray: &Ray, tri: &[Point; 3]) -> Option<TriangleHit> {
    let e1 = tri[1] - tri[0];
    let e2 = tri[2] - tri[0];
    let pvec = ray.direction.cross(e2);
    let det = e1.dot(pvec);
    if det.abs() < EPS {
        return None;
    }
    let inv_det = 1.0 / det;

    let tvec = ray.origin - tri[0];
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(e1);
    let v = ray.direction.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = e2.dot(qvec) * inv_det;
    if t < MIN_HIT_DISTANCE {
        return None;
    }
    Some(TriangleHit { t, u, v })
}

/// Closest point on a triangle to `p`.
///
/// Region-based search from Ericson, "Real-Time Collision Detection", 5.1.5.
pub fn closest_point_on_triangle(p: Point, tri: &[Point; 3]) -> Point {
    let (a, b, c) = (tri[0], tri[1], tri[2]);
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

pub fn distance_to_triangle(p: Point, tri: &[Point; 3]) -> f64 {
    p.distance(&closest_point_on_triangle(p, tri))
}

/// Mirror image of `p` in the plane of the triangle.
pub fn mirror_point(p: Point, tri: &[Point; 3]) -> Option<Point> {
    let n = triangle_normal(tri)?;
    Some(p - n * (2.0 * n.dot(p - tri[0])))
}
