//! Binaural gain table.
//!
//! Gains are indexed by ear, azimuth (1 degree steps, -180..180) and
//! elevation (1 degree steps, 90..-90) in the listener's frame, where
//! `z` is the facing direction and `x` points to the right ear.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::Vector;
use crate::sim::materials::{Bands, NUM_BANDS};

const AZIMUTHS: usize = 360;
const ELEVATIONS: usize = 180;

/// Gain on the fully shadowed side of the head.
const SHADOW_FLOOR: f64 = 0.1;

/// Half the distance between the ears in meters.
pub const EAR_OFFSET: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HrtfChannel {
    Left,
    Right,
}

impl HrtfChannel {
    fn index(self) -> usize {
        match self {
            HrtfChannel::Left => 0,
            HrtfChannel::Right => 1,
        }
    }

    /// +1 for the right ear, -1 for the left, along the listener's x axis.
    pub fn side(self) -> f64 {
        match self {
            HrtfChannel::Left => -1.0,
            HrtfChannel::Right => 1.0,
        }
    }
}

/// Orthonormal listener frame `[x, y, z]` with `z = facing`.
///
/// Returns `None` if `facing` and `up` are parallel or zero.
pub fn listener_basis(facing: Vector, up: Vector) -> Option<[Vector; 3]> {
    let z = facing.normalize()?;
    let x = up.cross(z).normalize()?;
    let y = z.cross(x);
    Some([x, y, z])
}

/// Expresses `d` in the listener frame.
pub fn to_listener(basis: &[Vector; 3], d: Vector) -> Vector {
    Vector::new(basis[0].dot(d), basis[1].dot(d), basis[2].dot(d))
}

/// Azimuth in radians, zero straight ahead, positive to the right.
pub fn azimuth(d: Vector) -> f64 {
    d.dx.atan2(d.dz)
}

/// Elevation in radians, positive upwards.
pub fn elevation(d: Vector) -> f64 {
    d.dy.atan2((d.dx * d.dx + d.dz * d.dz).sqrt())
}

pub struct HrtfTable {
    gains: Vec<Bands>,
}

impl HrtfTable {
    fn build() -> Self {
        let mut gains = Vec::with_capacity(2 * AZIMUTHS * ELEVATIONS);
        for channel in [HrtfChannel::Left, HrtfChannel::Right] {
            for a in 0..AZIMUTHS {
                let az = (a as f64 - 180.0).to_radians();
                for e in 0..ELEVATIONS {
                    let el = (90.0 - e as f64).to_radians();
                    let lateral = el.cos() * az.sin() * channel.side();
                    gains.push(shadowing(lateral));
                }
            }
        }
        Self { gains }
    }

    /// Shared table, built on first use.
    pub fn get() -> &'static HrtfTable {
        static TABLE: OnceLock<HrtfTable> = OnceLock::new();
        TABLE.get_or_init(HrtfTable::build)
    }

    /// Gains for a direction given in degrees. The azimuth bin is taken after
    /// shifting to 0..360, so -0.5 falls in the same bin as -1.
    pub fn lookup(&self, channel: HrtfChannel, azimuth_deg: f64, elevation_deg: f64) -> &Bands {
        let a = ((azimuth_deg + 180.0) as i64).rem_euclid(AZIMUTHS as i64) as usize;
        let e = (90 - elevation_deg as i64).clamp(0, ELEVATIONS as i64 - 1) as usize;
        &self.gains[(channel.index() * AZIMUTHS + a) * ELEVATIONS + e]
    }

    /// Gains for a listener-frame direction.
    pub fn gain(&self, channel: HrtfChannel, d: Vector) -> &Bands {
        self.lookup(channel, azimuth(d).to_degrees(), elevation(d).to_degrees())
    }
}

/// Head shadowing per band for a source with lateral component `lateral`
/// towards the ear (1 = on the ear's axis, -1 = opposite side).
fn shadowing(lateral: f64) -> Bands {
    let exposure = 0.5 * (1.0 + lateral.clamp(-1.0, 1.0));
    std::array::from_fn(|b| {
        // Low bands diffract around the head
        let sharpness = 2.0 * b as f64 / (NUM_BANDS - 1) as f64;
        SHADOW_FLOOR + (1.0 - SHADOW_FLOOR) * exposure.powf(sharpness)
    })
}
