//! Input signals injected at the source node.

/// Unit impulse followed by silence.
pub fn dirac(len: usize) -> Vec<f64> {
    let mut out = vec![0.0; len.max(1)];
    out[0] = 1.0;
    out
}

/// Gaussian pulse with most of its energy below `cutoff` Hz, peaking at `amplitude`.
///
/// Smoother than a dirac, so less dispersion error from the mesh.
pub fn gaussian_pulse(sample_rate: f64, cutoff: f64, amplitude: f64) -> Vec<f64> {
    let sigma = sample_rate / (2.0 * std::f64::consts::PI * cutoff.max(1e-6));
    let centre = (4.0 * sigma).ceil();
    let len = 2 * centre as usize + 1;
    (0..len)
        .map(|i| {
            let t = (i as f64 - centre) / sigma;
            amplitude * (-0.5 * t * t).exp()
        })
        .collect()
}
