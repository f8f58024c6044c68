use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Number of frequency bands used by the simulation (20 Hz to 20 kHz).
pub const NUM_BANDS: usize = 8;

/// Lowest band edge in Hz.
pub const LOWEST_FREQUENCY: f64 = 20.0;

/// Highest band edge in Hz.
pub const HIGHEST_FREQUENCY: f64 = 20_000.0;

/// Per-band values, one per simulation band.
pub type Bands = [f64; NUM_BANDS];

/// Logarithmically spaced band edge frequency `i` out of `bands`.
pub fn band_edge_frequency(i: usize, bands: usize, lower: f64, upper: f64) -> f64 {
    lower * (upper / lower).powf(i as f64 / bands as f64)
}

/// The `NUM_BANDS + 1` edge frequencies in Hz.
pub fn band_edges() -> [f64; NUM_BANDS + 1] {
    std::array::from_fn(|i| {
        band_edge_frequency(i, NUM_BANDS, LOWEST_FREQUENCY, HIGHEST_FREQUENCY)
    })
}

/// Centre frequency of each band in Hz (geometric centre between its edges).
pub fn band_centres() -> Bands {
    std::array::from_fn(|i| {
        band_edge_frequency(2 * i + 1, 2 * NUM_BANDS, LOWEST_FREQUENCY, HIGHEST_FREQUENCY)
    })
}

/// Acoustic surface with per-band specular and diffuse reflection coefficients.
///
/// Both coefficients are energy fractions. Their sum is the reflected energy,
/// the remainder is absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub specular: Bands,
    pub diffuse: Bands,
}

impl Surface {
    pub fn new(specular: Bands, diffuse: Bands) -> Result<Self> {
        for b in 0..NUM_BANDS {
            let total = specular[b] + diffuse[b];
            if specular[b] < 0.0 || diffuse[b] < 0.0 || total > 1.0 + 1e-12 {
                return Err(anyhow!(
                    "Invalid reflection coefficients in band {b}: specular={}, diffuse={}",
                    specular[b],
                    diffuse[b]
                ));
            }
        }
        Ok(Self { specular, diffuse })
    }

    /// Creates a surface with the same coefficients in all bands.
    pub fn uniform(specular: f64, diffuse: f64) -> Result<Self> {
        Self::new([specular; NUM_BANDS], [diffuse; NUM_BANDS])
    }

    /// Builds a surface from absorption and scattering coefficients.
    pub fn from_absorption(absorption: Bands, scattering: Bands) -> Result<Self> {
        let specular = std::array::from_fn(|b| {
            (1.0 - absorption[b].clamp(0.0, 1.0)) * (1.0 - scattering[b].clamp(0.0, 1.0))
        });
        let diffuse = std::array::from_fn(|b| {
            (1.0 - absorption[b].clamp(0.0, 1.0)) * scattering[b].clamp(0.0, 1.0)
        });
        Self::new(specular, diffuse)
    }

    /// Absorbed energy fraction per band.
    pub fn absorption(&self) -> Bands {
        std::array::from_fn(|b| (1.0 - self.specular[b] - self.diffuse[b]).clamp(0.0, 1.0))
    }

    /// Pressure reflection coefficient per band.
    pub fn reflectance(&self) -> Bands {
        std::array::from_fn(|b| (self.specular[b] + self.diffuse[b]).clamp(0.0, 1.0).sqrt())
    }

    /// Mean fraction of the reflected energy that is scattered.
    pub fn scattering(&self) -> f64 {
        let sum: f64 = (0..NUM_BANDS)
            .map(|b| {
                let total = self.specular[b] + self.diffuse[b];
                if total > 0.0 {
                    self.diffuse[b] / total
                } else {
                    0.0
                }
            })
            .sum();
        sum / NUM_BANDS as f64
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self {
            specular: [0.9; NUM_BANDS],
            diffuse: [0.05; NUM_BANDS],
        }
    }
}

/// Returns a named surface preset.
///
/// The table is built on first use and shared by all threads.
pub fn preset(name: &str) -> Option<&'static Surface> {
    static PRESETS: OnceLock<HashMap<&'static str, Surface>> = OnceLock::new();
    PRESETS
        .get_or_init(|| {
            let table: [(&'static str, Bands, Bands); 5] = [
                (
                    "concrete",
                    [0.01, 0.01, 0.01, 0.02, 0.02, 0.02, 0.03, 0.04],
                    [0.10; NUM_BANDS],
                ),
                (
                    "glass",
                    [0.35, 0.25, 0.18, 0.06, 0.04, 0.03, 0.02, 0.02],
                    [0.05; NUM_BANDS],
                ),
                (
                    "gypsum",
                    [0.30, 0.29, 0.20, 0.10, 0.05, 0.04, 0.07, 0.09],
                    [0.10; NUM_BANDS],
                ),
                (
                    "carpet",
                    [0.01, 0.02, 0.06, 0.14, 0.37, 0.60, 0.65, 0.70],
                    [0.40, 0.40, 0.40, 0.40, 0.50, 0.50, 0.50, 0.50],
                ),
                (
                    "wood",
                    [0.20, 0.15, 0.11, 0.10, 0.07, 0.06, 0.07, 0.08],
                    [0.15; NUM_BANDS],
                ),
            ];
            table
                .into_iter()
                .filter_map(|(name, absorption, scattering)| {
                    Surface::from_absorption(absorption, scattering)
                        .ok()
                        .map(|s| (name, s))
                })
                .collect()
        })
        .get(name)
}
