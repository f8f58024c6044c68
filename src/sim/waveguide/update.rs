//! One time step of the waveguide mesh.
//!
//! Both sweeps compute node `i` from the current pressures and the pressure
//! of `i` two steps back, overwriting the latter. The parallel sweep first
//! advances every boundary node (each owns its filter state), then every
//! other node, and gives the same result as the scalar one.

use rayon::prelude::*;

use super::boundary::{BT_INSIDE, BT_NONE, BT_REENTRANT, BoundaryState, FACE_BITS, boundary_ports, surrounding_ports};
use super::descriptor::{Locator, MeshDescriptor, NO_NEIGHBOR, PORTS};
use super::filters::{CanonicalCoefficients, filter_step_canonical};
use super::mesh::CondensedNode;
use super::{ERR_INF, ERR_NAN, ERR_NONE, ERR_OUTSIDE_MESH, ERR_OUTSIDE_RANGE, ERR_SUSPICIOUS_BOUNDARY};

/// Courant number of the rectilinear mesh.
pub const COURANT: f64 = 0.577_350_269_189_625_8;
pub const COURANT_SQ: f64 = 1.0 / 3.0;

/// How a node advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Air,
    Boundary,
    /// Outside the geometry, held at zero.
    Fixed,
}

pub fn update_kind(boundary_type: u32) -> UpdateKind {
    if boundary_type & (BT_INSIDE | BT_REENTRANT) != 0 {
        UpdateKind::Air
    } else if (1..=3).contains(&(boundary_type & FACE_BITS).count_ones()) {
        UpdateKind::Boundary
    } else {
        UpdateKind::Fixed
    }
}

/// Error bits for a freshly computed pressure.
pub fn value_flags(p: f64) -> u32 {
    if p.is_nan() {
        ERR_NAN
    } else if p.is_infinite() {
        ERR_INF
    } else if p.abs() > 1.0 {
        ERR_OUTSIDE_RANGE
    } else {
        ERR_NONE
    }
}

/// Read-only inputs of a sweep.
#[derive(Debug, Clone, Copy)]
pub struct Sweep<'a> {
    pub descriptor: &'a MeshDescriptor,
    pub nodes: &'a [CondensedNode],
    pub coefficients: &'a [CanonicalCoefficients],
}

impl<'a> Sweep<'a> {
    pub fn new(descriptor: &'a MeshDescriptor, nodes: &'a [CondensedNode], coefficients: &'a [CanonicalCoefficients]) -> Self {
        Self {
            descriptor,
            nodes,
            coefficients,
        }
    }

    fn air_update(&self, current: &[f64], loc: Locator, prev: f64) -> f64 {
        let sum: f64 = (0..PORTS)
            .map(|port| self.descriptor.neighbor_index(loc, port))
            .filter(|&n| n != NO_NEIGHBOR)
            .map(|n| current[n as usize])
            .sum();
        sum * COURANT_SQ - prev
    }

    /// Sum of the in-plane neighbours. Any missing one zeroes the whole sum.
    fn surrounding_sum(&self, current: &[f64], loc: Locator, bt: u32, flags: &mut u32) -> f64 {
        let mut sum = 0.0;
        for port in surrounding_ports(bt) {
            let n = self.descriptor.neighbor_index(loc, port);
            if n == NO_NEIGHBOR {
                *flags |= ERR_OUTSIDE_MESH;
                return 0.0;
            }
            let neighbour = self.nodes[n as usize].boundary_type;
            if neighbour == BT_NONE || neighbour == BT_INSIDE {
                *flags |= ERR_SUSPICIOUS_BOUNDARY;
            }
            sum += current[n as usize];
        }
        sum
    }

    fn boundary_update(&self, current: &[f64], loc: Locator, bt: u32, prev: f64, state: &mut BoundaryState, flags: &mut u32) -> f64 {
        let mut inner = 0.0;
        for port in boundary_ports(bt) {
            let n = self.descriptor.neighbor_index(loc, port);
            if n == NO_NEIGHBOR {
                *flags |= ERR_OUTSIDE_MESH;
            } else {
                inner += 2.0 * current[n as usize];
            }
        }
        let current_weighting = COURANT_SQ * (inner + self.surrounding_sum(current, loc, bt, flags));

        let mut filter_weighting = 0.0;
        let mut coeff_weighting = 0.0;
        for d in state.data() {
            let c = &self.coefficients[d.coefficient_index];
            filter_weighting += d.memory[0] / c.b[0];
            coeff_weighting += c.a[0] / c.b[0];
        }
        filter_weighting *= COURANT_SQ;
        coeff_weighting *= COURANT;

        let next = (current_weighting + filter_weighting + (coeff_weighting - 1.0) * prev) / (1.0 + coeff_weighting);

        for d in state.data_mut() {
            let c = &self.coefficients[d.coefficient_index];
            let input = c.a[0] * (prev - next) / (c.b[0] * COURANT) + d.memory[0] / c.b[0];
            filter_step_canonical(-input, &mut d.memory, c);
        }
        next
    }

    /// Next pressure of node `index`. `state` must be given for boundary nodes.
    pub fn next_pressure(&self, current: &[f64], index: usize, prev: f64, state: Option<&mut BoundaryState>, flags: &mut u32) -> f64 {
        let bt = self.nodes[index].boundary_type;
        let loc = self.descriptor.compute_locator(index);
        let next = match (update_kind(bt), state) {
            (UpdateKind::Air, _) => self.air_update(current, loc, prev),
            (UpdateKind::Boundary, Some(state)) => self.boundary_update(current, loc, bt, prev, state, flags),
            (UpdateKind::Boundary, None) | (UpdateKind::Fixed, _) => 0.0,
        };
        *flags |= value_flags(next);
        next
    }

    /// Single-threaded step. `previous` receives the new pressures.
    pub fn run_scalar(&self, current: &[f64], previous: &mut [f64], states: &mut [BoundaryState]) -> u32 {
        let mut flags = ERR_NONE;
        for (i, p) in previous.iter_mut().enumerate() {
            let boundary_index = self.nodes[i].boundary_index;
            let state = states.get_mut(boundary_index as usize);
            *p = self.next_pressure(current, i, *p, state, &mut flags);
        }
        flags
    }

    /// Rayon step. `owners[k]` is the node of `states[k]`; `scratch` holds
    /// the boundary results between the two phases.
    pub fn run_parallel(
        &self,
        current: &[f64],
        previous: &mut [f64],
        states: &mut [BoundaryState],
        owners: &[usize],
        scratch: &mut Vec<f64>,
    ) -> u32 {
        scratch.resize(states.len(), 0.0);
        let prev_read: &[f64] = previous;
        let boundary_flags = states
            .par_iter_mut()
            .zip(scratch.par_iter_mut())
            .zip(owners.par_iter())
            .map(|((state, out), &node)| {
                let mut flags = ERR_NONE;
                *out = self.next_pressure(current, node, prev_read[node], Some(state), &mut flags);
                flags
            })
            .reduce(|| ERR_NONE, |a, b| a | b);

        let boundary_next = &scratch[..];
        let air_flags = previous
            .par_iter_mut()
            .enumerate()
            .map(|(i, p)| {
                let node = self.nodes[i];
                let mut flags = ERR_NONE;
                *p = match update_kind(node.boundary_type) {
                    UpdateKind::Boundary if (node.boundary_index as usize) < boundary_next.len() => {
                        boundary_next[node.boundary_index as usize]
                    }
                    _ => self.next_pressure(current, i, *p, None, &mut flags),
                };
                flags
            })
            .reduce(|| ERR_NONE, |a, b| a | b);

        boundary_flags | air_flags
    }
}
