use std::collections::HashSet;

use anyhow::{Result, bail};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::geom::ray::Ray;
use crate::geom::triangles::triangle_normal;
use crate::sim::index::SpatialIndex;
use crate::sim::materials::NUM_BANDS;
use crate::sim::scene::SceneData;
use crate::{Point, Vector};

use super::Impulse;
use super::absorption::{AbsorptionModel, AirAbsorption, DiffuseAbsorption, SpecularAbsorption};
use super::config::RaytracerConfig;
use super::image_source::{PathKey, trace_image_source};
use super::reflection::{Lambert, ReflectionModel};
use super::results::RaytracerResults;

#[derive(Debug, Clone, Copy)]
pub struct RaytraceProgress {
    /// Rays traced so far.
    pub rays_done: usize,
    pub rays: usize,
}

impl RaytraceProgress {
    pub fn fraction(&self) -> f64 {
        if self.rays == 0 {
            1.0
        } else {
            self.rays_done as f64 / self.rays as f64
        }
    }
}

/// Called once per run with the diffuse impulses of the first rays.
pub type RayImpulseCallback = Box<dyn FnMut(&[Vec<Impulse>]) + Send>;

/// What a single ray found.
#[derive(Debug, Default)]
struct RayTrace {
    diffuse: Vec<Impulse>,
    paths: Vec<PathKey>,
}

/// Read-only inputs shared by all rays of a run.
struct TraceContext<'a> {
    scene: &'a SceneData,
    index: &'a SpatialIndex,
    source: Point,
    receiver: Point,
    config: &'a RaytracerConfig,
    air: &'a AirAbsorption,
}

impl TraceContext<'_> {
    /// Follows one ray for up to `reflections` bounces.
    ///
    /// Each ray starts with `1 / rays` of the source energy.
    fn trace_ray<R: Rng>(&self, rng: &mut R) -> RayTrace {
        let mut out = RayTrace::default();
        let z: f64 = rng.gen_range(-1.0..=1.0);
        let theta: f64 = rng.gen_range(-std::f64::consts::PI..=std::f64::consts::PI);
        let Some(mut ray) = Ray::new(self.source, Vector::sphere_point(z, theta)) else {
            return out;
        };

        let depth = self.config.effective_image_source_depth();
        let mut energy = [1.0 / self.config.rays as f64; NUM_BANDS];
        let mut distance = 0.0;
        let mut path = PathKey::new();
        let mut avoid = None;

        for _ in 0..self.config.reflections {
            let Some(hit) = self.index.intersect(self.scene, &ray, avoid) else {
                break;
            };
            let point = ray.point_at(hit.distance);
            distance += hit.distance;
            let surface = self.scene.triangle_surface(hit.triangle);

            if path.len() < depth {
                path.push(hit.triangle);
                out.paths.push(path.clone());
            }

            // The diffuse part leaves after this surface's reflection loss
            energy = SpecularAbsorption.apply(&energy, surface);
            if self.index.point_visible(self.scene, point, self.receiver, Some(hit.triangle)) {
                let total = distance + point.distance(&self.receiver);
                let volume = self.air.apply(&DiffuseAbsorption.apply(&energy, surface), total);
                out.diffuse.push(Impulse::new(volume, point, total / self.config.speed_of_sound));
            }

            let Some(normal) = triangle_normal(&self.scene.triangle_verts(hit.triangle)) else {
                break;
            };
            let direction = Lambert::new(surface.scattering()).reflect(ray.direction, normal, rng);
            let Some(next) = Ray::new(point, direction) else {
                break;
            };
            ray = next;
            avoid = Some(hit.triangle);
        }
        out
    }
}

/// Generator of ray `i` for a run seeded with `seed`.
fn ray_rng(seed: u64, i: usize) -> StdRng {
    StdRng::seed_from_u64(seed ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

pub struct Raytracer {
    config: RaytracerConfig,
    air: AirAbsorption,
    ray_callbacks: Vec<RayImpulseCallback>,
}

impl Raytracer {
    pub fn new(config: RaytracerConfig) -> Self {
        Self {
            config,
            air: AirAbsorption::standard(),
            ray_callbacks: Vec::new(),
        }
    }

    pub fn config(&self) -> &RaytracerConfig {
        &self.config
    }

    /// Registers a visual hook for per-ray impulses.
    pub fn add_ray_callback(&mut self, callback: RayImpulseCallback) {
        self.ray_callbacks.push(callback);
    }

    /// Traces all rays from `source` and collects impulses at `receiver`.
    ///
    /// `keep_going` is polled between batches of rays. Returns `Ok(None)`
    /// when cancelled.
    pub fn run<K, F>(
        &mut self,
        scene: &SceneData,
        index: &SpatialIndex,
        source: Point,
        receiver: Point,
        keep_going: K,
        mut progress: F,
    ) -> Result<Option<RaytracerResults>>
    where
        K: Fn() -> bool,
        F: FnMut(&RaytraceProgress),
    {
        self.config.validate()?;
        let config = &self.config;
        let seed = config.seed.unwrap_or_else(rand::random);
        info!(
            "Raytracing {} rays, {} reflections, image sources up to depth {}",
            config.rays,
            config.reflections,
            config.effective_image_source_depth()
        );

        let ctx = TraceContext {
            scene,
            index,
            source,
            receiver,
            config,
            air: &self.air,
        };
        let trace_path = |path: &[usize]| {
            trace_image_source(index, scene, source, receiver, path, &self.air, config.speed_of_sound)
        };

        let mut results = RaytracerResults::new(source, receiver, config.rays, config.reflections);
        match trace_path(&[]) {
            Some(direct) => {
                results.insert_image_source(PathKey::new(), direct);
            }
            None => debug!("No direct path from {source} to {receiver}"),
        }

        let mut rejected: HashSet<PathKey> = HashSet::new();
        let mut visual: Vec<Vec<Impulse>> = Vec::new();
        let batch_size = config.batch_size.max(1);
        let mut start = 0;
        while start < config.rays {
            if !keep_going() {
                info!("Raytrace cancelled after {start} rays");
                return Ok(None);
            }
            let end = (start + batch_size).min(config.rays);
            let traces: Vec<RayTrace> = (start..end)
                .into_par_iter()
                .map(|i| ctx.trace_ray(&mut ray_rng(seed, i)))
                .collect();

            let mut candidates: Vec<PathKey> = Vec::new();
            let mut batch_seen: HashSet<PathKey> = HashSet::new();
            for trace in traces {
                for path in trace.paths {
                    if !results.image_source.contains_key(&path) && !rejected.contains(&path) && batch_seen.insert(path.clone()) {
                        candidates.push(path);
                    }
                }
                if visual.len() < config.visual_rays {
                    visual.push(trace.diffuse.clone());
                }
                results.diffuse.extend(trace.diffuse);
            }

            let checked: Vec<(PathKey, Option<Impulse>)> = candidates
                .into_par_iter()
                .map(|path| {
                    let impulse = trace_path(&path);
                    (path, impulse)
                })
                .collect();
            for (path, impulse) in checked {
                match impulse {
                    Some(impulse) => {
                        results.insert_image_source(path, impulse);
                    }
                    None => {
                        rejected.insert(path);
                    }
                }
            }

            progress(&RaytraceProgress {
                rays_done: end,
                rays: config.rays,
            });
            start = end;
        }

        for callback in &mut self.ray_callbacks {
            callback(&visual);
        }

        info!(
            "Raytrace found {} image sources and {} diffuse impulses",
            results.image_source.len(),
            results.diffuse.len()
        );
        if results.is_empty() {
            bail!("Raytrace from {source} to {receiver} produced no impulses");
        }
        Ok(Some(results))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::sim::materials::Surface;

    fn room() -> (SceneData, SpatialIndex) {
        let scene = SceneData::shoebox(Point::new(0., 0., 0.), Point::new(5., 4., 3.), Surface::uniform(0.7, 0.2).unwrap()).unwrap();
        let index = SpatialIndex::for_scene(&scene, 3, 0.1).unwrap();
        (scene, index)
    }

    fn config(rays: usize, reflections: usize) -> RaytracerConfig {
        RaytracerConfig {
            rays,
            reflections,
            seed: Some(1234),
            batch_size: 64,
            ..RaytracerConfig::new()
        }
    }

    #[test]
    fn test_shoebox_results() {
        let (scene, index) = room();
        let source = Point::new(1.5, 1.2, 1.4);
        let receiver = Point::new(3.2, 2.5, 1.6);
        let mut tracer = Raytracer::new(config(500, 20));
        let results = tracer.run(&scene, &index, source, receiver, || true, |_| {}).unwrap().unwrap();

        let direct = results.direct().unwrap();
        assert!((direct.time - source.distance(&receiver) / 340.0).abs() < 1e-12);
        // All six first order image sources are found with this many rays
        assert_eq!(results.image_source.keys().filter(|k| k.len() == 1).count(), 6);
        assert!(!results.diffuse.is_empty());
        for impulse in results.get_all(false) {
            assert!(impulse.time >= direct.time - 1e-12);
            assert!(impulse.volume.iter().all(|&v| v >= 0.0 && v <= 1.0));
        }
        assert_eq!(results.rays, 500);
    }

    #[test]
    fn test_first_bounce_diffuse_volume() {
        let (scene, index) = room();
        let source = Point::new(1.5, 1.2, 1.4);
        let receiver = Point::new(3.2, 2.5, 1.6);
        let results = Raytracer::new(config(50, 1))
            .run(&scene, &index, source, receiver, || true, |_| {})
            .unwrap()
            .unwrap();
        assert!(!results.diffuse.is_empty());
        let air = AirAbsorption::standard();
        for impulse in &results.diffuse {
            // Initial share, then specular loss and diffuse fraction of the wall
            let attenuation = air.attenuation(impulse.time * 340.0);
            for b in 0..NUM_BANDS {
                let expected = 0.7 * 0.2 * attenuation[b] / 50.0;
                assert!((impulse.volume[b] - expected).abs() < 1e-12, "band {b}: {} vs {expected}", impulse.volume[b]);
            }
        }
    }

    #[test]
    fn test_seed_reproducible() {
        let (scene, index) = room();
        let source = Point::new(1.5, 1.2, 1.4);
        let receiver = Point::new(3.2, 2.5, 1.6);
        let a = Raytracer::new(config(200, 8)).run(&scene, &index, source, receiver, || true, |_| {}).unwrap();
        let b = Raytracer::new(config(200, 8)).run(&scene, &index, source, receiver, || true, |_| {}).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cancel_and_progress() {
        let (scene, index) = room();
        let source = Point::new(1.5, 1.2, 1.4);
        let receiver = Point::new(3.2, 2.5, 1.6);
        let mut tracer = Raytracer::new(config(256, 4));
        let mut fractions = Vec::new();
        tracer
            .run(&scene, &index, source, receiver, || true, |p| fractions.push(p.fraction()))
            .unwrap();
        assert_eq!(fractions, vec![0.25, 0.5, 0.75, 1.0]);
        let cancelled = tracer.run(&scene, &index, source, receiver, || false, |_| {}).unwrap();
        assert!(cancelled.is_none());
    }

    #[test]
    fn test_visual_callback_gets_first_rays() {
        let (scene, index) = room();
        let mut tracer = Raytracer::new(config(300, 4));
        let counts = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&counts);
        tracer.add_ray_callback(Box::new(move |rays| sink.lock().unwrap().push(rays.len())));
        tracer
            .run(&scene, &index, Point::new(1., 1., 1.), Point::new(4., 3., 2.), || true, |_| {})
            .unwrap();
        assert_eq!(*counts.lock().unwrap(), vec![100]);
    }

    #[test]
    fn test_zero_rays_rejected() {
        let (scene, index) = room();
        let mut tracer = Raytracer::new(config(0, 4));
        assert!(
            tracer
                .run(&scene, &index, Point::new(1., 1., 1.), Point::new(4., 3., 2.), || true, |_| {})
                .is_err()
        );
    }
}
