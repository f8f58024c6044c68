use serde::{Deserialize, Serialize};

use super::filters::BoundaryFilterKind;

/// Waveguide simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveguideConfig {
    /// Mesh update rate (Hz). Sets the node spacing.
    pub sample_rate: f64,
    /// m/s
    pub speed_of_sound: f64,
    /// kg/m3
    pub ambient_density: f64,
    pub boundary_filter: BoundaryFilterKind,
    /// Use the rayon sweep instead of the single-threaded one.
    pub parallel: bool,
    /// Highest frequency kept when the output is mixed with the raytracer.
    pub crossover: f64,
}

impl WaveguideConfig {
    pub fn new() -> Self {
        Self {
            sample_rate: 4000.0,
            speed_of_sound: 340.0,
            ambient_density: 1.225,
            boundary_filter: BoundaryFilterKind::Fitted,
            parallel: true,
            crossover: 500.0,
        }
    }

    /// Distance between neighbouring nodes for a Courant number of 1/sqrt(3).
    pub fn spacing(&self) -> f64 {
        self.speed_of_sound * 3.0_f64.sqrt() / self.sample_rate
    }

    /// Sample rate that gives the requested node spacing.
    pub fn sample_rate_for_spacing(speed_of_sound: f64, spacing: f64) -> f64 {
        speed_of_sound * 3.0_f64.sqrt() / spacing
    }
}

impl Default for WaveguideConfig {
    fn default() -> Self {
        Self::new()
    }
}
