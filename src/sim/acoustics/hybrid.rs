//! Joins waveguide (low band) and raytracer (high band) channels.

use log::debug;

use super::auralization::filters::BiquadCoeffs;

/// Highest crossover as a fraction of the sample rate. Biquads above this
/// get too close to Nyquist.
pub const MAX_CROSSOVER_RATIO: f64 = 0.45;

/// Resamples by linear interpolation between neighbouring samples.
pub fn resample_linear(signal: &[f64], from: f64, to: f64) -> Vec<f64> {
    if signal.is_empty() || from <= 0.0 || to <= 0.0 {
        return Vec::new();
    }
    let ratio = from / to;
    let last = signal.len() - 1;
    let len = (last as f64 * to / from + 1e-9).floor() as usize + 1;
    (0..len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let k = (pos.floor() as usize).min(last);
            let frac = pos - k as f64;
            match signal.get(k + 1) {
                Some(&next) => signal[k] + frac * (next - signal[k]),
                None => signal[k],
            }
        })
        .collect()
}

/// Removes DC with a zero-phase highpass at `cutoff` Hz.
pub fn remove_dc(signal: &mut [f64], cutoff: f64, sample_rate: f64) {
    if cutoff > 0.0 && cutoff < 0.5 * sample_rate {
        BiquadCoeffs::highpass(cutoff, sample_rate).run_twopass(signal);
    }
}

fn energy(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum()
}

/// Sums the waveguide below `crossover` Hz and the raytracer above it.
///
/// Both inputs are at `sample_rate`. The waveguide is scaled so its energy
/// below the crossover matches the raytracer's. The crossover is capped at
/// `MAX_CROSSOVER_RATIO * sample_rate`.
pub fn crossover_mix(waveguide: &[f64], raytracer: &[f64], crossover: f64, sample_rate: f64) -> Vec<f64> {
    let crossover = crossover.min(MAX_CROSSOVER_RATIO * sample_rate);
    let lowpass = BiquadCoeffs::lowpass(crossover, sample_rate);
    let highpass = BiquadCoeffs::highpass(crossover, sample_rate);

    let mut low = waveguide.to_vec();
    lowpass.run_twopass(&mut low);
    let mut reference = raytracer.to_vec();
    lowpass.run_twopass(&mut reference);
    let low_energy = energy(&low);
    let scale = if low_energy > 0.0 {
        (energy(&reference) / low_energy).sqrt()
    } else {
        0.0
    };
    debug!("Waveguide level scaled by {scale:.3e} at {crossover:.1} Hz crossover");

    let mut high = raytracer.to_vec();
    highpass.run_twopass(&mut high);

    let mut out = vec![0.0; low.len().max(high.len())];
    for (o, l) in out.iter_mut().zip(&low) {
        *o += scale * l;
    }
    for (o, h) in out.iter_mut().zip(&high) {
        *o += h;
    }
    out
}
