use rand::Rng;

use crate::Vector;

/// Defines how rays reflect off surfaces.
pub trait ReflectionModel {
    /// Computes the reflected direction given incident direction and surface normal.
    fn reflect<R: Rng>(&self, incident: Vector, normal: Vector, rng: &mut R) -> Vector;
}

/// Perfect specular (mirror) reflection.
pub struct Specular;

impl ReflectionModel for Specular {
    fn reflect<R: Rng>(&self, incident: Vector, normal: Vector, _rng: &mut R) -> Vector {
        incident.reflect(normal)
    }
}

/// Lambertian diffuse reflection (cosine-weighted hemisphere sampling via Malley's method).
pub struct Diffuse;

impl ReflectionModel for Diffuse {
    fn reflect<R: Rng>(&self, incident: Vector, normal: Vector, rng: &mut R) -> Vector {
        // The reflected ray stays on the incident side whichever way the normal faces
        let n = if incident.dot(normal) >= 0.0 { -normal } else { normal };

        let arbitrary = if n.dx.abs() < 0.9 {
            Vector::new(1.0, 0.0, 0.0)
        } else {
            Vector::new(0.0, 1.0, 0.0)
        };
        let tangent = n.cross(arbitrary).normalize().unwrap_or(Vector::new(1.0, 0.0, 0.0));
        let bitangent = n.cross(tangent);

        // Uniform on a disk, projected up onto the hemisphere: pdf = cos(theta) / pi
        let u1: f64 = rng.gen_range(0.0..1.0);
        let u2: f64 = rng.gen_range(0.0..1.0);
        let r = u1.sqrt();
        let phi = 2.0 * std::f64::consts::PI * u2;
        let z = (1.0 - u1).sqrt();

        tangent * (r * phi.cos()) + bitangent * (r * phi.sin()) + n * z
    }
}

/// Blend of the mirror direction and a diffuse sample, weighted by scattering.
pub struct Lambert {
    /// 0 = pure specular, 1 = pure diffuse.
    pub scattering: f64,
}

impl Lambert {
    pub fn new(scattering: f64) -> Self {
        Self {
            scattering: scattering.clamp(0.0, 1.0),
        }
    }
}

impl ReflectionModel for Lambert {
    fn reflect<R: Rng>(&self, incident: Vector, normal: Vector, rng: &mut R) -> Vector {
        let specular = Specular.reflect(incident, normal, rng);
        if self.scattering == 0.0 {
            return specular;
        }
        let diffuse = Diffuse.reflect(incident, normal, rng);
        (specular * (1.0 - self.scattering) + diffuse * self.scattering)
            .normalize()
            .unwrap_or(diffuse)
    }
}
