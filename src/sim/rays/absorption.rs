use crate::sim::materials::{Bands, Surface};

/// How ray energy changes when it meets a surface.
pub trait AbsorptionModel {
    /// Energy left after the interaction with `surface`.
    fn apply(&self, energy: &Bands, surface: &Surface) -> Bands;
}

/// Energy that continues along the specular path.
pub struct SpecularAbsorption;

impl AbsorptionModel for SpecularAbsorption {
    fn apply(&self, energy: &Bands, surface: &Surface) -> Bands {
        multiply_bands(energy, &surface.specular)
    }
}

/// Energy scattered diffusely by the surface.
pub struct DiffuseAbsorption;

impl AbsorptionModel for DiffuseAbsorption {
    fn apply(&self, energy: &Bands, surface: &Surface) -> Bands {
        multiply_bands(energy, &surface.diffuse)
    }
}

/// Distance-dependent attenuation in air, per band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AirAbsorption {
    /// Exponent per metre (negative).
    pub coefficients: Bands,
}

impl AirAbsorption {
    /// Room conditions, from 20 Hz up to 20 kHz.
    pub fn standard() -> Self {
        let k = [-0.1, -0.2, -0.5, -1.1, -2.7, -9.4, -29.0, -60.0];
        Self {
            coefficients: k.map(|k| 0.001 * k),
        }
    }

    /// Energy factor after `distance` metres.
    pub fn attenuation(&self, distance: f64) -> Bands {
        self.coefficients.map(|k| (distance * k).exp())
    }

    pub fn apply(&self, energy: &Bands, distance: f64) -> Bands {
        multiply_bands(energy, &self.attenuation(distance))
    }
}

impl Default for AirAbsorption {
    fn default() -> Self {
        Self::standard()
    }
}

/// Elementwise product of two band arrays.
pub fn multiply_bands(a: &Bands, b: &Bands) -> Bands {
    std::array::from_fn(|i| a[i] * b[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::materials::NUM_BANDS;

    #[test]
    fn test_surface_absorption() {
        let surface = Surface::uniform(0.6, 0.3).unwrap();
        let energy = [2.0; NUM_BANDS];
        assert!(SpecularAbsorption.apply(&energy, &surface).iter().all(|&e| (e - 1.2).abs() < 1e-12));
        assert!(DiffuseAbsorption.apply(&energy, &surface).iter().all(|&e| (e - 0.6).abs() < 1e-12));
    }

    #[test]
    fn test_air_absorption() {
        let air = AirAbsorption::standard();
        assert_eq!(air.attenuation(0.0), [1.0; NUM_BANDS]);
        let a = air.attenuation(10.0);
        assert!((a[0] - (-0.001f64).exp()).abs() < 1e-12);
        assert!((a[7] - (-0.6f64).exp()).abs() < 1e-12);
        // Higher bands lose more
        assert!(a.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_air_applies_per_band() {
        let air = AirAbsorption::standard();
        let energy = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let out = air.apply(&energy, 10.0);
        let a = air.attenuation(10.0);
        assert!((out[3] - 4.0 * a[3]).abs() < 1e-12);
        assert!((out[7] - 8.0 * a[7]).abs() < 1e-12);
    }
}
