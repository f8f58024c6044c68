//! Boundary filters of the waveguide mesh.
//!
//! Each surface is modelled by an order-6 IIR filter in impedance form, run in
//! transposed direct form II. The reflectance filter is a broadband gain times
//! three peaking biquads fitted to the lowest bands of the surface.

use std::f64::consts::PI;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::sim::materials::{Surface, band_edges};

pub const BIQUAD_ORDER: usize = 2;
pub const BIQUAD_SECTIONS: usize = 3;
pub const CANONICAL_ORDER: usize = BIQUAD_ORDER * BIQUAD_SECTIONS;

/// Quality factor of the fitted peaking sections.
const PEAK_Q: f64 = 1.414;

/// Upper bound on the flat reflectance, keeps the impedance filter finite.
const MAX_FLAT_REFLECTANCE: f64 = 0.999;

pub type FilterMemory = [f64; CANONICAL_ORDER];

/// Numerator and denominator of an IIR filter of order `N - 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients<const N: usize> {
    pub b: [f64; N],
    pub a: [f64; N],
}

pub type BiquadCoefficients = Coefficients<{ BIQUAD_ORDER + 1 }>;
pub type CanonicalCoefficients = Coefficients<{ CANONICAL_ORDER + 1 }>;

/// How surfaces are turned into boundary filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundaryFilterKind {
    /// Frequency-independent reflectance from the mean absorption.
    Flat,
    /// Peaking sections fitted to the per-band reflectance.
    #[default]
    Fitted,
}

/// Parameters of one peaking section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterDescriptor {
    pub gain_db: f64,
    pub centre: f64,
    pub q: f64,
}

pub fn a2db(a: f64) -> f64 {
    20.0 * a.log10()
}

pub fn db2a(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// One step of the transposed direct form II filter.
pub fn filter_step_canonical(input: f64, memory: &mut FilterMemory, c: &CanonicalCoefficients) -> f64 {
    let output = (input * c.b[0] + memory[0]) / c.a[0];
    for i in 0..CANONICAL_ORDER - 1 {
        memory[i] = c.b[i + 1] * input - c.a[i + 1] * output + memory[i + 1];
    }
    memory[CANONICAL_ORDER - 1] = c.b[CANONICAL_ORDER] * input - c.a[CANONICAL_ORDER] * output;
    output
}

/// Peaking EQ biquad (audio EQ cookbook), normalised so that `a[0] = 1`.
pub fn peak_coefficients(d: &FilterDescriptor, sample_rate: f64) -> BiquadCoefficients {
    let a = db2a(d.gain_db / 2.0);
    let w0 = 2.0 * PI * d.centre / sample_rate;
    let cw0 = w0.cos();
    let alpha = w0.sin() / (2.0 * d.q);
    let a0 = 1.0 + alpha / a;
    Coefficients {
        b: [(1.0 + alpha * a) / a0, (-2.0 * cw0) / a0, (1.0 - alpha * a) / a0],
        a: [1.0, (-2.0 * cw0) / a0, (1.0 - alpha / a) / a0],
    }
}

/// Polynomial product of two filters.
pub fn convolve<const A: usize, const B: usize, const C: usize>(
    x: &Coefficients<A>,
    y: &Coefficients<B>,
) -> Coefficients<C> {
    debug_assert_eq!(A + B - 1, C);
    let mut out = Coefficients {
        b: [0.0; C],
        a: [0.0; C],
    };
    for i in 0..A {
        for j in 0..B {
            out.b[i + j] += x.b[i] * y.b[j];
            out.a[i + j] += x.a[i] * y.a[j];
        }
    }
    out
}

/// Cascade of the three sections as a single order-6 filter.
pub fn convolve_sections(sections: &[BiquadCoefficients; BIQUAD_SECTIONS]) -> CanonicalCoefficients {
    let first: Coefficients<5> = convolve(&sections[0], &sections[1]);
    convolve(&first, &sections[2])
}

/// True if all poles of the denominator lie inside the unit circle.
///
/// Step-down (Schur-Cohn) recursion on the reflection coefficients.
pub fn is_stable(a: &[f64]) -> bool {
    if a.is_empty() || a[0] == 0.0 {
        return false;
    }
    let mut current: Vec<f64> = a.iter().map(|x| x / a[0]).collect();
    while current.len() > 1 {
        let n = current.len() - 1;
        let k = current[n];
        if k.abs() >= 1.0 {
            return false;
        }
        current = (0..n)
            .map(|i| (current[i] - k * current[n - i]) / (1.0 - k * k))
            .collect();
    }
    true
}

/// Converts a reflectance filter into the impedance filter the boundary update uses.
pub fn to_impedance_coefficients(c: &CanonicalCoefficients) -> CanonicalCoefficients {
    let mut out = Coefficients {
        b: std::array::from_fn(|i| c.a[i] + c.b[i]),
        a: std::array::from_fn(|i| c.a[i] - c.b[i]),
    };
    let norm = out.a[0];
    if norm != 0.0 {
        for i in 0..=CANONICAL_ORDER {
            out.b[i] /= norm;
            out.a[i] /= norm;
        }
    }
    out
}

/// Broadband gain of the fitted reflectance, taken from the bands above the fit.
pub fn base_reflectance(surface: &Surface) -> f64 {
    let reflectance = surface.reflectance();
    let upper = &reflectance[BIQUAD_SECTIONS..];
    (upper.iter().sum::<f64>() / upper.len() as f64).clamp(1e-6, MAX_FLAT_REFLECTANCE)
}

/// Peaking sections for the three lowest bands of a surface, relative to `base`.
pub fn compute_filter_descriptors(surface: &Surface, base: f64) -> [FilterDescriptor; BIQUAD_SECTIONS] {
    let edges = band_edges();
    let reflectance = surface.reflectance();
    std::array::from_fn(|i| FilterDescriptor {
        gain_db: a2db(reflectance[i].clamp(1e-6, MAX_FLAT_REFLECTANCE) / base),
        centre: (edges[i] + edges[i + 1]) / 2.0,
        q: PEAK_Q,
    })
}

/// Impedance filter with a broadband reflectance `r`.
pub fn flat_coefficients(r: f64) -> CanonicalCoefficients {
    let mut reflectance = Coefficients {
        b: [0.0; CANONICAL_ORDER + 1],
        a: [0.0; CANONICAL_ORDER + 1],
    };
    reflectance.b[0] = r.clamp(0.0, MAX_FLAT_REFLECTANCE);
    reflectance.a[0] = 1.0;
    to_impedance_coefficients(&reflectance)
}

/// Flat impedance filter from the mean absorption of a surface.
pub fn flat_surface_coefficients(surface: &Surface) -> CanonicalCoefficients {
    let absorption = surface.absorption();
    let mean = absorption.iter().sum::<f64>() / absorption.len() as f64;
    flat_coefficients((1.0 - mean).sqrt())
}

/// Fitted impedance filter for a surface, falling back to flat if the fit is unstable.
pub fn fitted_surface_coefficients(surface: &Surface, sample_rate: f64) -> CanonicalCoefficients {
    let base = base_reflectance(surface);
    let sections = compute_filter_descriptors(surface, base).map(|d| peak_coefficients(&d, sample_rate));
    let mut reflectance = convolve_sections(&sections);
    for b in &mut reflectance.b {
        *b *= base;
    }
    let impedance = to_impedance_coefficients(&reflectance);
    if is_stable(&impedance.a) && impedance.b[0] != 0.0 {
        impedance
    } else {
        warn!("Unstable boundary filter at {sample_rate:.1} Hz, using flat reflectance");
        flat_surface_coefficients(surface)
    }
}

/// Boundary filter coefficients for every surface, in surface order.
pub fn surface_coefficients(surfaces: &[Surface], kind: BoundaryFilterKind, sample_rate: f64) -> Vec<CanonicalCoefficients> {
    surfaces
        .iter()
        .map(|s| match kind {
            BoundaryFilterKind::Flat => flat_surface_coefficients(s),
            BoundaryFilterKind::Fitted => fitted_surface_coefficients(s, sample_rate),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_step_passthrough() {
        let mut c = Coefficients {
            b: [0.0; CANONICAL_ORDER + 1],
            a: [0.0; CANONICAL_ORDER + 1],
        };
        c.b[0] = 0.5;
        c.a[0] = 1.0;
        let mut memory = [0.0; CANONICAL_ORDER];
        assert!((filter_step_canonical(2.0, &mut memory, &c) - 1.0).abs() < 1e-12);
        assert!(memory.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_filter_step_delay() {
        // y[n] = x[n-1]
        let mut c = Coefficients {
            b: [0.0; CANONICAL_ORDER + 1],
            a: [0.0; CANONICAL_ORDER + 1],
        };
        c.b[1] = 1.0;
        c.a[0] = 1.0;
        let mut memory = [0.0; CANONICAL_ORDER];
        let out: Vec<f64> = [1.0, 0.0, 0.0]
            .iter()
            .map(|&x| filter_step_canonical(x, &mut memory, &c))
            .collect();
        assert_eq!(out, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_unity_peak_is_identity() {
        let d = FilterDescriptor {
            gain_db: 0.0,
            centre: 100.0,
            q: PEAK_Q,
        };
        let c = peak_coefficients(&d, 5000.0);
        for i in 0..3 {
            assert!((c.b[i] - c.a[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_convolve() {
        let x = Coefficients { b: [1.0, 1.0], a: [1.0, 0.5] };
        let y = Coefficients { b: [1.0, -1.0], a: [1.0, 0.0] };
        let z: Coefficients<3> = convolve(&x, &y);
        assert_eq!(z.b, [1.0, 0.0, -1.0]);
        assert_eq!(z.a, [1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_is_stable() {
        assert!(is_stable(&[1.0, -0.5]));
        assert!(!is_stable(&[1.0, -1.5]));
        // Poles at 0.9 and 0.8
        assert!(is_stable(&[1.0, -1.7, 0.72]));
        // Poles at 1.1 and 0.5
        assert!(!is_stable(&[1.0, -1.6, 0.55]));
    }

    #[test]
    fn test_flat_impedance() {
        let c = flat_coefficients(0.5);
        // b' = (1 + r) / (1 - r), a' = 1
        assert!((c.a[0] - 1.0).abs() < 1e-12);
        assert!((c.b[0] - 3.0).abs() < 1e-12);
        assert!(c.b[1..].iter().all(|&x| x == 0.0));
        // Fully reflective surfaces are clamped
        assert!(flat_coefficients(1.0).b[0].is_finite());
    }

    #[test]
    fn test_fitted_dc_gain() {
        let surface = Surface::uniform(0.3, 0.1).unwrap();
        let base = base_reflectance(&surface);
        assert!((base - 0.4_f64.sqrt()).abs() < 1e-12);
        // Equal bands give 0 dB sections
        for d in compute_filter_descriptors(&surface, base) {
            assert!(d.gain_db.abs() < 1e-9);
        }
        let c = fitted_surface_coefficients(&surface, 5000.0);
        let flat = flat_coefficients(base);
        let dc = |x: &[f64]| x.iter().sum::<f64>();
        assert!((dc(&c.b) / dc(&c.a) - dc(&flat.b) / dc(&flat.a)).abs() < 1e-6);
    }

    #[test]
    fn test_fitted_surfaces_are_stable() {
        let surfaces = [
            Surface::default(),
            Surface::uniform(0.3, 0.1).unwrap(),
            Surface::uniform(0.0, 0.0).unwrap(),
        ];
        for kind in [BoundaryFilterKind::Flat, BoundaryFilterKind::Fitted] {
            for c in surface_coefficients(&surfaces, kind, 10_000.0) {
                assert!(is_stable(&c.a), "{kind:?} gave {c:?}");
                assert!(c.b[0] != 0.0);
            }
        }
    }
}
