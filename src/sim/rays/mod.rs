//! Stochastic raytracer for the high-frequency part of an impulse response.
//!
//! Rays leave the source uniformly and bounce off the scene. Every bounce
//! that sees the receiver adds a diffuse impulse. The surface sequences the
//! rays visit are checked as image sources and give the specular impulses.

pub mod absorption;
pub mod config;
pub mod image_source;
pub mod reflection;
pub mod results;
pub mod simulation;

use serde::{Deserialize, Serialize};

use crate::Point;
use crate::sim::materials::Bands;

pub use config::RaytracerConfig;
pub use results::RaytracerResults;
pub use simulation::{Raytracer, RaytraceProgress};

/// One reflection reaching the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Impulse {
    /// Energy per band.
    pub volume: Bands,
    /// Where the sound last came from: a reflection point or the source.
    pub position: Point,
    /// Arrival time in seconds.
    pub time: f64,
}

impl Impulse {
    pub fn new(volume: Bands, position: Point, time: f64) -> Self {
        Self {
            volume,
            position,
            time,
        }
    }
}
