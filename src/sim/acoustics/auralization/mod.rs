//! Band filtering, FFT convolution and WAV output.
//!
//! Per-band buffers produced by the raytracer are filtered to their band
//! and summed to one broadband channel here.

pub mod convolve;
pub mod filters;
pub mod wav;

use rayon::prelude::*;

use crate::sim::materials::band_edges;

pub use filters::{BandFilter, FilterKind};
pub use wav::{BitDepth, read_wav, write_wav};

/// Converts signed energy values to signed pressure in place.
pub fn energy_to_pressure(samples: &mut [f64]) {
    for s in samples.iter_mut() {
        *s = s.abs().sqrt().copysign(*s);
    }
}

/// Largest absolute sample of all channels.
pub fn peak(channels: &[Vec<f64>]) -> f64 {
    channels
        .iter()
        .flatten()
        .fold(0.0_f64, |a, &b| a.max(b.abs()))
}

/// Filters each band buffer to its frequency band and sums them.
///
/// `bands[b]` is filtered to `band_edges()[b]..band_edges()[b + 1]`.
/// The output is as long as the longest band.
pub fn filter_and_mixdown(bands: &[Vec<f64>], sample_rate: f64, kind: FilterKind) -> Vec<f64> {
    let filter = kind.band_filter();
    let edges = band_edges();
    let filtered: Vec<Vec<f64>> = bands
        .par_iter()
        .enumerate()
        .filter(|(b, _)| *b + 1 < edges.len())
        .map(|(b, band)| {
            let mut signal = band.clone();
            filter.filter(&mut signal, edges[b], edges[b + 1], sample_rate);
            signal
        })
        .collect();

    let len = bands.iter().map(Vec::len).max().unwrap_or(0);
    let mut output = vec![0.0; len];
    for band in &filtered {
        for (out, &s) in output.iter_mut().zip(band) {
            *out += s;
        }
    }
    output
}
