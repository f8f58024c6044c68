//! Rectilinear digital waveguide mesh for the low-frequency part of an impulse response.
//!
//! The scene is sampled on a cubic lattice. Air nodes run the standard
//! 6-port scattering update, boundary nodes run an impedance filter per
//! exposed direction.

pub mod boundary;
pub mod config;
pub mod descriptor;
pub mod filters;
pub mod mesh;
pub mod receiver;
pub mod signal;
pub mod simulation;
pub mod update;

use thiserror::Error;

use crate::Point;

pub use config::WaveguideConfig;
pub use descriptor::MeshDescriptor;
pub use mesh::{CondensedNode, Mesh, MeshNode};
pub use receiver::{Receiver, ReceiverSample};
pub use simulation::{WaveguideOutput, WaveguideSimulator, WaveguideState};

/// Bits of the per-step error word.
pub const ERR_NONE: u32 = 0;
pub const ERR_INF: u32 = 1 << 0;
pub const ERR_NAN: u32 = 1 << 1;
pub const ERR_OUTSIDE_RANGE: u32 = 1 << 2;
pub const ERR_OUTSIDE_MESH: u32 = 1 << 3;
pub const ERR_SUSPICIOUS_BOUNDARY: u32 = 1 << 4;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WaveguideError {
    #[error("waveguide mesh has no nodes")]
    EmptyMesh,
    #[error("waveguide mesh has not been built")]
    NotBuilt,
    #[error("source {0} is not next to an air node")]
    SourceOutsideMesh(Point),
    #[error("receiver {0} is not next to an air node")]
    ReceiverOutsideMesh(Point),
    #[error("receiver node {node} has {found} of 6 neighbours")]
    InsufficientNeighbors { node: usize, found: usize },
    #[error("waveguide became unstable at step {step} (error flags {flags:#07b})")]
    Unstable { step: usize, flags: u32 },
}

/// Human readable names of the bits set in an error word.
pub fn describe_error_flags(flags: u32) -> Vec<&'static str> {
    [
        (ERR_INF, "inf"),
        (ERR_NAN, "nan"),
        (ERR_OUTSIDE_RANGE, "outside range"),
        (ERR_OUTSIDE_MESH, "outside mesh"),
        (ERR_SUSPICIOUS_BOUNDARY, "suspicious boundary"),
    ]
    .into_iter()
    .filter(|(bit, _)| flags & bit != 0)
    .map(|(_, name)| name)
    .collect()
}
