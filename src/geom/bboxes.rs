use crate::geom::EPS;
use crate::{Point, Vector};
use serde::{Deserialize, Serialize};

/// Tolerance used by the separating-axis tests.
///
/// Touching shapes count as overlapping.
const OVERLAP_TOL: f64 = 1e-9;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Point,
    pub max: Point,
}

impl Aabb {
    pub fn new(min: Point, max: Point) -> Self {
        Self {
            min: min.min(&max),
            max: min.max(&max),
        }
    }

    /// Bounding box holding all points `pts`. Returns `None` for an empty slice.
    pub fn from_points(pts: &[Point]) -> Option<Self> {
        let first = *pts.first()?;
        let (min, max) = pts
            .iter()
            .fold((first, first), |(mn, mx), p| (mn.min(p), mx.max(p)));
        Some(Self { min, max })
    }

    pub fn centre(&self) -> Point {
        Point::new_between_2_points(self.min, self.max, 0.5)
    }

    /// Edge lengths along x, y and z.
    pub fn dimensions(&self) -> Vector {
        self.max - self.min
    }

    /// Returns a copy grown by `padding` on every side.
    pub fn padded(&self, padding: f64) -> Self {
        let pad = Vector::new(padding, padding, padding);
        Self {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    /// Checks whether a point is inside or on the boundary of the box.
    pub fn contains(&self, p: Point) -> bool {
        (0..3).all(|axis| {
            p.coord(axis) >= self.min.coord(axis) - EPS
                && p.coord(axis) <= self.max.coord(axis) + EPS
        })
    }

    /// Checks whether two boxes overlap (touching counts as overlapping).
    pub fn overlaps(&self, other: &Self) -> bool {
        are_bboxes_overlapping(self.min, self.max, other.min, other.max)
    }

    /// One of the 8 equal octants of this box.
    ///
    /// Bit 0 of `index` selects the upper half along x, bit 1 along y, bit 2 along z.
    pub fn octant(&self, index: usize) -> Self {
        let c = self.centre();
        let pick = |bit: usize, lo: f64, mid: f64, hi: f64| {
            if index & bit != 0 { (mid, hi) } else { (lo, mid) }
        };
        let (x0, x1) = pick(1, self.min.x, c.x, self.max.x);
        let (y0, y1) = pick(2, self.min.y, c.y, self.max.y);
        let (z0, z1) = pick(4, self.min.z, c.z, self.max.z);
        Self {
            min: Point::new(x0, y0, z0),
            max: Point::new(x1, y1, z1),
        }
    }

    /// Separating-axis test between this box and a triangle.
    pub fn overlaps_triangle(&self, tri: &[Point; 3]) -> bool {
        let c = self.centre();
        let h = self.dimensions() * 0.5;
        let v = [tri[0] - c, tri[1] - c, tri[2] - c];

        // Box face normals
        for axis in 0..3 {
            let (lo, hi) = min_max(v.iter().map(|p| p.component(axis)));
            let r = h.component(axis);
            if lo > r + OVERLAP_TOL || hi < -r - OVERLAP_TOL {
                return false;
            }
        }

        let edges = [v[1] - v[0], v[2] - v[1], v[0] - v[2]];

        // Triangle plane
        if !overlap_on_axis(edges[0].cross(edges[1]), &v, h) {
            return false;
        }

        // Edge cross products
        for edge in edges {
            for axis in 0..3 {
                if !overlap_on_axis(Vector::axis(axis, false).cross(edge), &v, h) {
                    return false;
                }
            }
        }
        true
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
        (lo.min(x), hi.max(x))
    })
}

fn overlap_on_axis(axis: Vector, v: &[Vector; 3], h: Vector) -> bool {
    if axis.length() < EPS {
        // Degenerate axis cannot separate anything
        return true;
    }
    let (lo, hi) = min_max(v.iter().map(|p| p.dot(axis)));
    let r = h.dx * axis.dx.abs() + h.dy * axis.dy.abs() + h.dz * axis.dz.abs();
    let tol = OVERLAP_TOL * axis.length();
    !(lo > r + tol || hi < -r - tol)
}

/// Axis-aligned rectangle in the xy plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: (f64, f64),
    pub max: (f64, f64),
}

impl Rect {
    pub fn new(min: (f64, f64), max: (f64, f64)) -> Self {
        Self {
            min: (min.0.min(max.0), min.1.min(max.1)),
            max: (min.0.max(max.0), min.1.max(max.1)),
        }
    }

    pub fn centre(&self) -> (f64, f64) {
        (
            0.5 * (self.min.0 + self.max.0),
            0.5 * (self.min.1 + self.max.1),
        )
    }

    /// One of the 4 equal quadrants. Bit 0 selects upper x, bit 1 upper y.
    pub fn quadrant(&self, index: usize) -> Self {
        let (cx, cy) = self.centre();
        let (x0, x1) = if index & 1 != 0 {
            (cx, self.max.0)
        } else {
            (self.min.0, cx)
        };
        let (y0, y1) = if index & 2 != 0 {
            (cy, self.max.1)
        } else {
            (self.min.1, cy)
        };
        Self {
            min: (x0, y0),
            max: (x1, y1),
        }
    }

    /// Separating-axis test between the rectangle and the xy projection of a triangle.
    pub fn overlaps_triangle(&self, tri: &[Point; 3]) -> bool {
        let (cx, cy) = self.centre();
        let hx = 0.5 * (self.max.0 - self.min.0);
        let hy = 0.5 * (self.max.1 - self.min.1);
        let v: Vec<(f64, f64)> = tri.iter().map(|p| (p.x - cx, p.y - cy)).collect();

        let mut axes = vec![(1.0, 0.0), (0.0, 1.0)];
        for i in 0..3 {
            let (ax, ay) = v[i];
            let (bx, by) = v[(i + 1) % 3];
            axes.push((-(by - ay), bx - ax));
        }

        axes.into_iter().all(|(ax, ay)| {
            let len = (ax * ax + ay * ay).sqrt();
            if len < EPS {
                return true;
            }
            let (lo, hi) = min_max(v.iter().map(|&(x, y)| x * ax + y * ay));
            let r = hx * ax.abs() + hy * ay.abs();
            let tol = OVERLAP_TOL * len;
            !(lo > r + tol || hi < -r - tol)
        })
    }
}

/// Checks whether two bounding boxes overlap.
///
/// Takes min and max corners of each bbox.
/// Returns true if boxes overlap (including touching).
pub fn are_bboxes_overlapping(min1: Point, max1: Point, min2: Point, max2: Point) -> bool {
    // Boxes don't overlap if separated along any axis
    if max1.x < min2.x - EPS || min1.x > max2.x + EPS {
        return false;
    }
    if max1.y < min2.y - EPS || min1.y > max2.y + EPS {
        return false;
    }
    if max1.z < min2.z - EPS || min1.z > max2.z + EPS {
        return false;
    }
    true
}
