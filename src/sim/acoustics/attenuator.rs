//! Directional receivers applied to raytracer impulses and waveguide samples.

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::sim::materials::{Bands, NUM_BANDS, band_edges};
use crate::sim::rays::Impulse;
use crate::sim::waveguide::ReceiverSample;
use crate::{Point, Vector};

use super::hrtf::{EAR_OFFSET, HrtfChannel, HrtfTable, listener_basis, to_listener};

/// An impulse after directional weighting. `volume` is energy per band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttenuatedImpulse {
    pub volume: Bands,
    pub time: f64,
}

impl From<&Impulse> for AttenuatedImpulse {
    fn from(impulse: &Impulse) -> Self {
        Self {
            volume: impulse.volume,
            time: impulse.time,
        }
    }
}

/// First-order polar pattern, from omnidirectional (`shape = 0`)
/// to figure-of-eight (`shape = 1`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MicrophoneFields")]
pub struct Microphone {
    pub pointing: Vector,
    pub shape: f64,
}

#[derive(Deserialize)]
struct MicrophoneFields {
    pointing: Vector,
    shape: f64,
}

impl TryFrom<MicrophoneFields> for Microphone {
    type Error = anyhow::Error;

    fn try_from(fields: MicrophoneFields) -> Result<Self> {
        Self::new(fields.pointing, fields.shape)
    }
}

impl Microphone {
    pub fn new(pointing: Vector, shape: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&shape) {
            bail!("Microphone shape must be within [0, 1], got {shape}");
        }
        let pointing = pointing
            .normalize()
            .ok_or_else(|| anyhow!("Microphone pointing direction is zero"))?;
        Ok(Self { pointing, shape })
    }

    /// Checks a microphone whose fields were set directly.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.shape) {
            bail!("Microphone shape must be within [0, 1], got {}", self.shape);
        }
        if (self.pointing.length() - 1.0).abs() > 1e-9 {
            bail!("Microphone pointing direction {} is not a unit vector", self.pointing);
        }
        Ok(())
    }

    pub fn omni() -> Self {
        Self {
            pointing: Vector::new(0., 0., 1.),
            shape: 0.0,
        }
    }

    /// Pressure gain for sound arriving from direction `incidence`.
    pub fn gain(&self, incidence: Vector) -> f64 {
        let alignment = incidence.normalize().map_or(0.0, |d| self.pointing.dot(d));
        (1.0 - self.shape) + self.shape * alignment
    }
}

impl Default for Microphone {
    fn default() -> Self {
        Self::omni()
    }
}

/// One ear of a binaural listener.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HrtfFields")]
pub struct Hrtf {
    pub facing: Vector,
    pub up: Vector,
    pub channel: HrtfChannel,
}

#[derive(Deserialize)]
struct HrtfFields {
    facing: Vector,
    up: Vector,
    channel: HrtfChannel,
}

impl TryFrom<HrtfFields> for Hrtf {
    type Error = anyhow::Error;

    fn try_from(fields: HrtfFields) -> Result<Self> {
        Self::new(fields.facing, fields.up, fields.channel)
    }
}

impl Hrtf {
    pub fn new(facing: Vector, up: Vector, channel: HrtfChannel) -> Result<Self> {
        if listener_basis(facing, up).is_none() {
            bail!("HRTF facing {facing} and up {up} do not span a plane");
        }
        Ok(Self { facing, up, channel })
    }

    pub fn validate(&self) -> Result<()> {
        if listener_basis(self.facing, self.up).is_none() {
            bail!("HRTF facing {} and up {} do not span a plane", self.facing, self.up);
        }
        Ok(())
    }

    /// Per-band pressure gain for sound arriving from direction `incidence`.
    pub fn gain(&self, incidence: Vector) -> Bands {
        let unit: Bands = [1.0; NUM_BANDS];
        match (listener_basis(self.facing, self.up), incidence.normalize()) {
            (Some(basis), Some(d)) => *HrtfTable::get().gain(self.channel, to_listener(&basis, d)),
            _ => unit,
        }
    }

    /// World position of this ear for a head centred at `centre`.
    pub fn ear_position(&self, centre: Point) -> Point {
        match listener_basis(self.facing, self.up) {
            Some([x, _, _]) => centre + x * (EAR_OFFSET * self.channel.side()),
            None => centre,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Attenuator {
    Microphone(Microphone),
    Hrtf(Hrtf),
}

impl Attenuator {
    pub fn validate(&self) -> Result<()> {
        match self {
            Attenuator::Microphone(mic) => mic.validate(),
            Attenuator::Hrtf(hrtf) => hrtf.validate(),
        }
    }

    /// Per-band pressure gain for sound arriving from direction `incidence`.
    pub fn band_gains(&self, incidence: Vector) -> Bands {
        match self {
            Attenuator::Microphone(mic) => [mic.gain(incidence); NUM_BANDS],
            Attenuator::Hrtf(hrtf) => hrtf.gain(incidence),
        }
    }

    /// Weights impulse energies by the squared gain towards each impulse.
    ///
    /// For an HRTF the arrival time is shifted by the extra distance to the ear.
    pub fn attenuate_impulses(&self, impulses: &[Impulse], receiver: Point, speed_of_sound: f64) -> Vec<AttenuatedImpulse> {
        impulses
            .iter()
            .filter(|impulse| impulse.volume.iter().any(|&v| v != 0.0))
            .map(|impulse| {
                let gains = self.band_gains(impulse.position - receiver);
                let mut time = impulse.time;
                if let Attenuator::Hrtf(hrtf) = self {
                    let ear = hrtf.ear_position(receiver);
                    time += (impulse.position.distance(&ear) - impulse.position.distance(&receiver)) / speed_of_sound;
                }
                AttenuatedImpulse {
                    volume: std::array::from_fn(|b| impulse.volume[b] * gains[b] * gains[b]),
                    time,
                }
            })
            .collect()
    }

    /// Broadband gain for the waveguide, averaged over the bands it resolves.
    fn waveguide_gain(&self, incidence: Vector, max_frequency: f64) -> f64 {
        let gains = self.band_gains(incidence);
        let edges = band_edges();
        let bands = (0..NUM_BANDS)
            .take_while(|&b| edges[b] < max_frequency)
            .count()
            .max(1);
        gains[..bands].iter().sum::<f64>() / bands as f64
    }

    /// Converts waveguide receiver samples to signed pressure.
    ///
    /// Each sample is `copysign(sqrt(|I| * g^2), p)` where `g` is the gain
    /// towards the direction the sound arrives from (opposite to `I`).
    pub fn attenuate_waveguide(&self, samples: &[ReceiverSample], max_frequency: f64) -> Vec<f64> {
        samples
            .iter()
            .map(|s| {
                let g = self.waveguide_gain(-s.intensity, max_frequency);
                (s.intensity.length() * g * g).sqrt().copysign(s.pressure)
            })
            .collect()
    }
}

impl Default for Attenuator {
    fn default() -> Self {
        Attenuator::Microphone(Microphone::omni())
    }
}
