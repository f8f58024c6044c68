use std::f64::consts::{PI, SQRT_2};

use serde::{Deserialize, Serialize};

use super::convolve::FftConvolver;

/// Second-order (biquad) filter coefficients in Direct Form I.
///
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

/// Biquad filter state for Direct Form I processing.
#[derive(Debug, Clone, Default)]
pub struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a single sample through the filter.
    pub fn process(&mut self, sample: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * sample + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = sample;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

impl BiquadCoeffs {
    fn normalised(b: [f64; 3], a: [f64; 3]) -> Self {
        Self {
            b0: b[0] / a[0],
            b1: b[1] / a[0],
            b2: b[2] / a[0],
            a1: a[1] / a[0],
            a2: a[2] / a[0],
        }
    }

    /// Cookbook bandpass (constant 0 dB peak gain) between `lo` and `hi` Hz.
    pub fn bandpass(lo: f64, hi: f64, sample_rate: f64) -> Self {
        let centre = (lo * hi).sqrt();
        let q = centre / (hi - lo);
        let w0 = 2.0 * PI * centre / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();
        Self::normalised([alpha, 0.0, -alpha], [1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha])
    }

    /// Butterworth lowpass.
    pub fn lowpass(cutoff: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * PI * cutoff / sample_rate;
        let alpha = w0.sin() / SQRT_2;
        let cos_w0 = w0.cos();
        let b1 = 1.0 - cos_w0;
        Self::normalised([b1 / 2.0, b1, b1 / 2.0], [1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha])
    }

    /// Butterworth highpass.
    pub fn highpass(cutoff: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * PI * cutoff / sample_rate;
        let alpha = w0.sin() / SQRT_2;
        let cos_w0 = w0.cos();
        let b1 = 1.0 + cos_w0;
        Self::normalised([b1 / 2.0, -b1, b1 / 2.0], [1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha])
    }

    /// Filters `signal` in place.
    pub fn run(&self, signal: &mut [f64]) {
        let mut state = BiquadState::new();
        for s in signal.iter_mut() {
            *s = state.process(*s, self);
        }
    }

    /// Filters forwards then backwards: squared magnitude, zero phase.
    pub fn run_twopass(&self, signal: &mut [f64]) {
        self.run(signal);
        signal.reverse();
        self.run(signal);
        signal.reverse();
    }
}

/// Limits a band to what the sample rate can represent, or `None` if nothing is left.
fn usable_band(lo: f64, hi: f64, sample_rate: f64) -> Option<(f64, f64)> {
    let nyquist = 0.5 * sample_rate;
    if lo >= nyquist || hi <= lo {
        return None;
    }
    Some((lo.max(0.0), hi.min(0.99 * nyquist)))
}

/// Restricts a signal to one frequency band.
pub trait BandFilter: Send + Sync {
    /// Filters `signal` in place, keeping `lo..hi` Hz.
    fn filter(&self, signal: &mut [f64], lo: f64, hi: f64, sample_rate: f64);
}

/// Linear-phase FIR bandpass with a Blackman window, applied by FFT convolution.
pub struct WindowedSinc {
    pub taps: usize,
}

impl WindowedSinc {
    pub fn new(taps: usize) -> Self {
        // Odd length so the kernel has a centre tap
        Self { taps: taps | 1 }
    }

    pub fn kernel(&self, lo: f64, hi: f64, sample_rate: f64) -> Vec<f64> {
        let fl = lo / sample_rate;
        let fh = hi / sample_rate;
        let n = self.taps;
        let centre = (n - 1) as f64 / 2.0;
        let sinc = |x: f64| if x == 0.0 { 1.0 } else { (PI * x).sin() / (PI * x) };
        (0..n)
            .map(|i| {
                let m = i as f64 - centre;
                let ideal = 2.0 * fh * sinc(2.0 * fh * m) - 2.0 * fl * sinc(2.0 * fl * m);
                let phase = 2.0 * PI * i as f64 / (n - 1) as f64;
                let window = 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos();
                ideal * window
            })
            .collect()
    }
}

impl Default for WindowedSinc {
    fn default() -> Self {
        Self::new(99)
    }
}

impl BandFilter for WindowedSinc {
    fn filter(&self, signal: &mut [f64], lo: f64, hi: f64, sample_rate: f64) {
        let Some((lo, hi)) = usable_band(lo, hi, sample_rate) else {
            signal.fill(0.0);
            return;
        };
        let kernel = self.kernel(lo, hi, sample_rate);
        let full = FftConvolver::new(&kernel).convolve(signal);
        // Drop the kernel delay
        let delay = self.taps / 2;
        let len = signal.len();
        signal.copy_from_slice(&full[delay..delay + len]);
    }
}

/// Single forward pass of a biquad bandpass.
pub struct Onepass;

impl BandFilter for Onepass {
    fn filter(&self, signal: &mut [f64], lo: f64, hi: f64, sample_rate: f64) {
        match usable_band(lo, hi, sample_rate) {
            Some((lo, hi)) => BiquadCoeffs::bandpass(lo.max(1.0), hi, sample_rate).run(signal),
            None => signal.fill(0.0),
        }
    }
}

/// Zero-phase biquad bandpass.
pub struct Twopass;

impl BandFilter for Twopass {
    fn filter(&self, signal: &mut [f64], lo: f64, hi: f64, sample_rate: f64) {
        match usable_band(lo, hi, sample_rate) {
            Some((lo, hi)) => BiquadCoeffs::bandpass(lo.max(1.0), hi, sample_rate).run_twopass(signal),
            None => signal.fill(0.0),
        }
    }
}

/// Zero-phase Linkwitz-Riley crossover: highpass at `lo`, lowpass at `hi`.
///
/// Adjacent bands sum to a flat magnitude response.
pub struct LinkwitzRiley;

impl BandFilter for LinkwitzRiley {
    fn filter(&self, signal: &mut [f64], lo: f64, hi: f64, sample_rate: f64) {
        let nyquist = 0.5 * sample_rate;
        if lo >= nyquist || hi <= lo {
            signal.fill(0.0);
            return;
        }
        if lo > 0.0 {
            BiquadCoeffs::highpass(lo, sample_rate).run_twopass(signal);
        }
        if hi < 0.99 * nyquist {
            BiquadCoeffs::lowpass(hi, sample_rate).run_twopass(signal);
        }
    }
}

/// Band filter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterKind {
    WindowedSinc,
    Onepass,
    Twopass,
    #[default]
    LinkwitzRiley,
}

impl FilterKind {
    pub fn band_filter(self) -> Box<dyn BandFilter> {
        match self {
            FilterKind::WindowedSinc => Box::new(WindowedSinc::default()),
            FilterKind::Onepass => Box::new(Onepass),
            FilterKind::Twopass => Box::new(Twopass),
            FilterKind::LinkwitzRiley => Box::new(LinkwitzRiley),
        }
    }
}
