use serde::{Deserialize, Serialize};

use crate::Point;
use crate::geom::bboxes::Aabb;

/// Marks a missing neighbour in a port array.
pub const NO_NEIGHBOR: u32 = u32::MAX;

/// Number of face-adjacent neighbours of a node.
pub const PORTS: usize = 6;

/// Port order of neighbour arrays.
pub const PORT_NX: usize = 0;
pub const PORT_PX: usize = 1;
pub const PORT_NY: usize = 2;
pub const PORT_PY: usize = 3;
pub const PORT_NZ: usize = 4;
pub const PORT_PZ: usize = 5;

/// Integer lattice coordinates of a node.
pub type Locator = [i64; 3];

/// Unit step of each port in lattice coordinates.
pub const PORT_OFFSETS: [Locator; PORTS] = [
    [-1, 0, 0],
    [1, 0, 0],
    [0, -1, 0],
    [0, 1, 0],
    [0, 0, -1],
    [0, 0, 1],
];

/// Shape of a rectilinear lattice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshDescriptor {
    pub min_corner: Point,
    pub dims: [usize; 3],
    pub spacing: f64,
}

impl MeshDescriptor {
    pub fn new(min_corner: Point, dims: [usize; 3], spacing: f64) -> Self {
        Self {
            min_corner,
            dims,
            spacing,
        }
    }

    /// Lattice covering `aabb` with nodes `spacing` apart, starting at its min corner.
    pub fn for_aabb(aabb: &Aabb, spacing: f64) -> Self {
        let extent = aabb.dimensions();
        let dims = [extent.dx, extent.dy, extent.dz].map(|e| (e / spacing + 1e-9).floor().max(0.0) as usize);
        Self::new(aabb.min, dims, spacing)
    }

    pub fn num_nodes(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    pub fn contains_locator(&self, loc: Locator) -> bool {
        (0..3).all(|a| loc[a] >= 0 && (loc[a] as usize) < self.dims[a])
    }

    /// Row-major index, x fastest.
    pub fn compute_index(&self, loc: Locator) -> usize {
        loc[0] as usize + loc[1] as usize * self.dims[0] + loc[2] as usize * self.dims[0] * self.dims[1]
    }

    pub fn compute_locator(&self, index: usize) -> Locator {
        let x = index % self.dims[0];
        let rest = index / self.dims[0];
        let y = rest % self.dims[1];
        let z = rest / self.dims[1];
        [x as i64, y as i64, z as i64]
    }

    pub fn compute_position(&self, loc: Locator) -> Point {
        Point::new(
            self.min_corner.x + loc[0] as f64 * self.spacing,
            self.min_corner.y + loc[1] as f64 * self.spacing,
            self.min_corner.z + loc[2] as f64 * self.spacing,
        )
    }

    /// Nearest lattice point to `p`, clamped to the lattice.
    pub fn compute_locator_for_position(&self, p: Point) -> Locator {
        std::array::from_fn(|a| {
            let rel = (p.coord(a) - self.min_corner.coord(a)) / self.spacing;
            let max = self.dims[a].saturating_sub(1) as f64;
            rel.round().clamp(0.0, max) as i64
        })
    }

    /// Index of the neighbour of `loc` through `port`, or [`NO_NEIGHBOR`].
    pub fn neighbor_index(&self, loc: Locator, port: usize) -> u32 {
        let offset = PORT_OFFSETS[port];
        let n = [loc[0] + offset[0], loc[1] + offset[1], loc[2] + offset[2]];
        if self.contains_locator(n) {
            self.compute_index(n) as u32
        } else {
            NO_NEIGHBOR
        }
    }

    /// The 6 face-adjacent neighbours of node `index` in port order.
    pub fn compute_neighbors(&self, index: usize) -> [u32; PORTS] {
        let loc = self.compute_locator(index);
        std::array::from_fn(|port| self.neighbor_index(loc, port))
    }
}
