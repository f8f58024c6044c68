use anyhow::{Result, bail};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::Point;
use crate::sim::rays::RaytracerResults;
use crate::sim::waveguide::WaveguideOutput;

use super::attenuator::{AttenuatedImpulse, Attenuator};
use super::auralization::{BitDepth, FilterKind, energy_to_pressure, filter_and_mixdown, peak};
use super::flatten::flatten_impulses;
use super::hybrid::{crossover_mix, remove_dc, resample_linear};

/// Samples below this amplitude at the end of the output are trimmed.
pub const TAIL_FLOOR: f64 = 1e-5;

/// Waveguide DC is removed below this frequency in Hz.
const DC_CUTOFF: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessConfig {
    pub output_sample_rate: f64,
    pub filter: FilterKind,
    /// Scale all channels together so the loudest sample is 1.
    pub normalize: bool,
    /// Shift the output so the earliest arrival lands at time zero.
    pub remove_predelay: bool,
    pub trim_tail: bool,
    /// Applied after normalization.
    pub volume_scale: f64,
    pub bit_depth: BitDepth,
}

impl PostprocessConfig {
    pub fn new() -> Self {
        Self {
            output_sample_rate: 44_100.0,
            filter: FilterKind::default(),
            normalize: true,
            remove_predelay: false,
            trim_tail: true,
            volume_scale: 1.0,
            bit_depth: BitDepth::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.output_sample_rate > 0.0) {
            bail!("Output sample rate must be positive, got {}", self.output_sample_rate);
        }
        if !self.volume_scale.is_finite() {
            bail!("Volume scale must be finite");
        }
        Ok(())
    }
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Earliest nonzero arrival time, or zero if there is none.
pub fn predelay<I>(times: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    times
        .into_iter()
        .filter(|&t| t > 0.0)
        .min_by(f64::total_cmp)
        .unwrap_or(0.0)
}

/// Shortens all channels to the last sample at or above `floor` in any channel.
pub fn trim_tail(channels: &mut [Vec<f64>], floor: f64) {
    let len = channels
        .iter()
        .map(|c| c.iter().rposition(|v| v.abs() >= floor).map_or(0, |i| i + 1))
        .max()
        .unwrap_or(0);
    for channel in channels.iter_mut() {
        channel.truncate(len);
    }
}

/// Scales all channels by one factor so the loudest sample is 1.
pub fn normalize(channels: &mut [Vec<f64>]) {
    let max = peak(channels);
    if max > 0.0 {
        scale(channels, 1.0 / max);
    }
}

pub fn scale(channels: &mut [Vec<f64>], factor: f64) {
    for s in channels.iter_mut().flatten() {
        *s *= factor;
    }
}

/// Waveguide output for one source/receiver pair, with the crossover it is valid below.
#[derive(Debug, Clone, Copy)]
pub struct WaveguideBand<'a> {
    pub output: &'a WaveguideOutput,
    pub crossover: f64,
}

/// Turns simulation results into output channels.
pub struct Postprocessor<'a> {
    config: &'a PostprocessConfig,
    speed_of_sound: f64,
}

impl<'a> Postprocessor<'a> {
    pub fn new(config: &'a PostprocessConfig, speed_of_sound: f64) -> Self {
        Self { config, speed_of_sound }
    }

    /// Broadband channel of impulses already weighted by one capsule.
    ///
    /// Impulse times are moved earlier by `delay` seconds.
    pub fn raytracer_channel(&self, attenuated: &[AttenuatedImpulse], delay: f64) -> Vec<f64> {
        let sample_rate = self.config.output_sample_rate;
        let shifted: Vec<AttenuatedImpulse> = attenuated
            .iter()
            .map(|impulse| AttenuatedImpulse {
                time: impulse.time - delay,
                ..*impulse
            })
            .collect();
        let mut bands = flatten_impulses(&shifted, sample_rate);
        for band in &mut bands {
            energy_to_pressure(band);
        }
        filter_and_mixdown(&bands, sample_rate, self.config.filter)
    }

    /// Waveguide samples seen through `attenuator`, at the output rate.
    pub fn waveguide_channel(&self, waveguide: &WaveguideBand, attenuator: &Attenuator, delay: f64) -> Vec<f64> {
        let output = waveguide.output;
        let mut signal = attenuator.attenuate_waveguide(&output.samples, waveguide.crossover);
        remove_dc(&mut signal, DC_CUTOFF, output.sample_rate);
        let mut resampled = resample_linear(&signal, output.sample_rate, self.config.output_sample_rate);
        let skip = ((delay * self.config.output_sample_rate).round() as usize).min(resampled.len());
        resampled.drain(..skip);
        resampled
    }

    /// One channel per capsule of a receiver at `position`, finished per the config.
    pub fn process(
        &self,
        raytracer: &RaytracerResults,
        waveguide: Option<WaveguideBand>,
        position: Point,
        capsules: &[Attenuator],
    ) -> Result<Vec<Vec<f64>>> {
        self.config.validate()?;
        if capsules.is_empty() {
            bail!("Receiver at {position} has no capsules");
        }
        let impulses = raytracer.get_all(false);
        let attenuated: Vec<Vec<AttenuatedImpulse>> = capsules
            .iter()
            .map(|attenuator| attenuator.attenuate_impulses(&impulses, position, self.speed_of_sound))
            .collect();
        // One delay for all capsules, taken after the ear offsets, so the
        // earliest capsule arrival lands on sample zero
        let delay = if self.config.remove_predelay {
            predelay(attenuated.iter().flatten().map(|i| i.time))
        } else {
            0.0
        };
        debug!("Postprocessing {} impulses, predelay {delay:.4} s", impulses.len());

        let mut channels: Vec<Vec<f64>> = capsules
            .iter()
            .zip(&attenuated)
            .map(|(attenuator, weighted)| {
                let high = self.raytracer_channel(weighted, delay);
                match &waveguide {
                    Some(band) => {
                        let low = self.waveguide_channel(band, attenuator, delay);
                        crossover_mix(&low, &high, band.crossover, self.config.output_sample_rate)
                    }
                    None => high,
                }
            })
            .collect();

        // Channels of one receiver share a length
        let len = channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in &mut channels {
            channel.resize(len, 0.0);
        }
        self.finish(&mut channels);
        info!("Postprocessed {} channels of {} samples", channels.len(), channels.first().map_or(0, Vec::len));
        Ok(channels)
    }

    /// Applies normalization, tail trimming and the volume scale.
    pub fn finish(&self, channels: &mut [Vec<f64>]) {
        if self.config.normalize {
            normalize(channels);
        }
        if self.config.trim_tail {
            trim_tail(channels, TAIL_FLOOR);
        }
        if self.config.volume_scale != 1.0 {
            scale(channels, self.config.volume_scale);
        }
    }
}
