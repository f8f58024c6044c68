//! Boundary node typing and per-node boundary filter state.
//!
//! Boundary bits name the direction from a boundary node toward the air.
//! A node with one bit set is a face, two an edge and three a corner.

use super::descriptor::{Locator, MeshDescriptor, PORT_OFFSETS, PORTS};
use super::filters::{CANONICAL_ORDER, FilterMemory};

pub const BT_NONE: u32 = 0;
pub const BT_INSIDE: u32 = 1 << 0;
pub const BT_NX: u32 = 1 << 1;
pub const BT_PX: u32 = 1 << 2;
pub const BT_NY: u32 = 1 << 3;
pub const BT_PY: u32 = 1 << 4;
pub const BT_NZ: u32 = 1 << 5;
pub const BT_PZ: u32 = 1 << 6;
pub const BT_REENTRANT: u32 = 1 << 7;

/// All six direction bits.
pub const FACE_BITS: u32 = BT_NX | BT_PX | BT_NY | BT_PY | BT_NZ | BT_PZ;

/// Direction bit of a port.
pub const fn port_to_boundary_type(port: usize) -> u32 {
    1 << (port + 1)
}

/// Ports named by the direction bits of `bt`, in port order.
pub fn boundary_ports(bt: u32) -> Vec<usize> {
    (0..PORTS)
        .filter(|&p| bt & port_to_boundary_type(p) != 0)
        .collect()
}

/// In-plane ports of a face or edge node: the axes not named by its bits.
///
/// A face has 4, an edge 2 and a corner none.
pub fn surrounding_ports(bt: u32) -> Vec<usize> {
    (0..3)
        .filter(|&axis| bt & (port_to_boundary_type(2 * axis) | port_to_boundary_type(2 * axis + 1)) == 0)
        .flat_map(|axis| [2 * axis, 2 * axis + 1])
        .collect()
}

fn combined(ports: &[usize]) -> (Locator, u32) {
    let mut loc = [0; 3];
    let mut bt = BT_NONE;
    for &p in ports {
        for a in 0..3 {
            loc[a] += PORT_OFFSETS[p][a];
        }
        bt |= port_to_boundary_type(p);
    }
    (loc, bt)
}

/// Pairs of ports on different axes, the 12 edge diagonals.
fn edge_directions() -> Vec<[usize; 2]> {
    let mut out = Vec::with_capacity(12);
    for a0 in 0..3 {
        for a1 in a0 + 1..3 {
            for s1 in 0..2 {
                for s0 in 0..2 {
                    out.push([2 * a0 + s0, 2 * a1 + s1]);
                }
            }
        }
    }
    out
}

/// The 8 corner diagonals.
fn corner_directions() -> Vec<[usize; 3]> {
    let mut out = Vec::with_capacity(8);
    for sz in 0..2 {
        for sy in 0..2 {
            for sx in 0..2 {
                out.push([sx, 2 + sy, 4 + sz]);
            }
        }
    }
    out
}

/// Boundary type of an outside node at `loc`.
///
/// Face directions are tried first, then edge diagonals, then corner
/// diagonals. Exactly one inside neighbour in a group gives its combined
/// bits; several give [`BT_REENTRANT`]. No inside neighbour at all gives
/// [`BT_NONE`].
pub fn compute_boundary_type(descriptor: &MeshDescriptor, inside: &[bool], loc: Locator) -> u32 {
    let try_directions = |directions: &mut dyn Iterator<Item = (Locator, u32)>| -> u32 {
        let mut found = Vec::new();
        for (offset, bt) in directions {
            let adjacent = [loc[0] + offset[0], loc[1] + offset[1], loc[2] + offset[2]];
            if descriptor.contains_locator(adjacent) && inside[descriptor.compute_index(adjacent)] {
                found.push(bt);
            }
        }
        match found.len() {
            0 => BT_NONE,
            1 => found[0],
            _ => BT_REENTRANT,
        }
    };

    let faces = try_directions(&mut (0..PORTS).map(|p| combined(&[p])));
    if faces != BT_NONE {
        return faces;
    }
    let edges = try_directions(&mut edge_directions().into_iter().map(|d| combined(&d)));
    if edges != BT_NONE {
        return edges;
    }
    try_directions(&mut corner_directions().into_iter().map(|d| combined(&d)))
}

/// Filter memory of one exposed face and the surface it reflects from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryData {
    pub memory: FilterMemory,
    pub coefficient_index: usize,
}

impl BoundaryData {
    pub fn new(coefficient_index: usize) -> Self {
        Self {
            memory: [0.0; CANONICAL_ORDER],
            coefficient_index,
        }
    }
}

/// Filter states of a boundary node, one per exposed direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryState {
    Face([BoundaryData; 1]),
    Edge([BoundaryData; 2]),
    Corner([BoundaryData; 3]),
}

impl BoundaryState {
    /// State for a node with `bits` exposed directions, or `None` for other counts.
    pub fn for_bits(bits: u32, coefficient_index: usize) -> Option<Self> {
        let d = BoundaryData::new(coefficient_index);
        match bits {
            1 => Some(Self::Face([d])),
            2 => Some(Self::Edge([d; 2])),
            3 => Some(Self::Corner([d; 3])),
            _ => None,
        }
    }

    pub fn data(&self) -> &[BoundaryData] {
        match self {
            Self::Face(d) => d,
            Self::Edge(d) => d,
            Self::Corner(d) => d,
        }
    }

    pub fn data_mut(&mut self) -> &mut [BoundaryData] {
        match self {
            Self::Face(d) => d,
            Self::Edge(d) => d,
            Self::Corner(d) => d,
        }
    }

    pub fn reset(&mut self) {
        for d in self.data_mut() {
            d.memory = [0.0; CANONICAL_ORDER];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;

    /// 5x5x5 lattice with the centre 3x3x3 block inside.
    fn block() -> (MeshDescriptor, Vec<bool>) {
        let d = MeshDescriptor::new(Point::new(0., 0., 0.), [5, 5, 5], 1.0);
        let inside = (0..d.num_nodes())
            .map(|i| d.compute_locator(i).iter().all(|&c| (1..4).contains(&c)))
            .collect();
        (d, inside)
    }

    #[test]
    fn test_face_edge_corner() {
        let (d, inside) = block();
        // Outside the -x face, the air is in +x direction
        assert_eq!(compute_boundary_type(&d, &inside, [0, 2, 2]), BT_PX);
        assert_eq!(compute_boundary_type(&d, &inside, [4, 2, 2]), BT_NX);
        assert_eq!(compute_boundary_type(&d, &inside, [2, 2, 4]), BT_NZ);
        assert_eq!(compute_boundary_type(&d, &inside, [0, 0, 2]), BT_PX | BT_PY);
        assert_eq!(compute_boundary_type(&d, &inside, [4, 2, 0]), BT_NX | BT_PZ);
        assert_eq!(compute_boundary_type(&d, &inside, [0, 4, 4]), BT_PX | BT_NY | BT_NZ);
        assert_eq!(compute_boundary_type(&d, &inside, [0, 0, 0]), BT_PX | BT_PY | BT_PZ);
    }

    #[test]
    fn test_reentrant_and_none() {
        let d = MeshDescriptor::new(Point::new(0., 0., 0.), [3, 1, 1], 1.0);
        // Outside node between two inside nodes
        let inside = vec![true, false, true];
        assert_eq!(compute_boundary_type(&d, &inside, [1, 0, 0]), BT_REENTRANT);
        let inside = vec![false, false, false];
        assert_eq!(compute_boundary_type(&d, &inside, [1, 0, 0]), BT_NONE);
    }

    #[test]
    fn test_ports() {
        assert_eq!(boundary_ports(BT_PX | BT_NZ), vec![1, 4]);
        assert_eq!(surrounding_ports(BT_PX), vec![2, 3, 4, 5]);
        assert_eq!(surrounding_ports(BT_PX | BT_NZ), vec![2, 3]);
        assert!(surrounding_ports(BT_PX | BT_NY | BT_PZ).is_empty());
        assert_eq!(edge_directions().len(), 12);
        assert_eq!(corner_directions().len(), 8);
    }

    #[test]
    fn test_state_arity() {
        assert!(matches!(BoundaryState::for_bits(2, 3), Some(BoundaryState::Edge(_))));
        assert_eq!(BoundaryState::for_bits(3, 1).unwrap().data().len(), 3);
        assert!(BoundaryState::for_bits(0, 0).is_none());
        assert!(BoundaryState::for_bits(4, 0).is_none());
    }
}
