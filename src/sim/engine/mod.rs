//! Background runner for whole simulations.
//!
//! One worker thread builds the spatial index and the waveguide mesh, then
//! processes every source/receiver pair in turn: waveguide run, raytrace,
//! postprocess. The mesh and index are shared by all pairs.

pub mod config;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::Point;
use crate::sim::acoustics::auralization::{BitDepth, write_wav};
use crate::sim::acoustics::{Postprocessor, WaveguideBand};
use crate::sim::index::SpatialIndex;
use crate::sim::rays::Raytracer;
use crate::sim::rays::simulation::RayImpulseCallback;
use crate::sim::scene::SceneData;
use crate::sim::waveguide::WaveguideSimulator;
use crate::sim::waveguide::signal::dirac;
use crate::sim::waveguide::simulation::PressureCallback;

pub use config::{EngineConfig, ReceiverConfig};

/// Stage reported to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Initialising,
    Mesh,
    Waveguide,
    Raytrace,
    Postprocess,
    Finished,
}

/// Called from the worker thread with the current stage and the overall
/// fraction of that stage done across all pairs.
pub type ProgressCallback = Box<dyn FnMut(State, f64) + Send>;

/// Called once with the positions of all mesh nodes.
pub type NodePositionsCallback = Box<dyn FnOnce(&[Point]) + Send>;

/// Optional observers of a run.
#[derive(Default)]
pub struct Hooks {
    pub progress: Option<ProgressCallback>,
    pub node_positions: Option<NodePositionsCallback>,
    pub pressure: Option<PressureCallback>,
    pub rays: Option<RayImpulseCallback>,
}

impl Hooks {
    pub fn with_progress(progress: ProgressCallback) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    fn report(&mut self, state: State, fraction: f64) {
        if let Some(progress) = &mut self.progress {
            progress(state, fraction.clamp(0.0, 1.0));
        }
    }
}

/// Output channels of one source/receiver pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairResult {
    pub source: Point,
    pub receiver: Point,
    pub channels: Vec<Vec<f64>>,
    pub sample_rate: f64,
}

impl PairResult {
    pub fn write_wav(&self, path: &Path, bit_depth: BitDepth) -> Result<()> {
        write_wav(path, &self.channels, self.sample_rate.round() as u32, bit_depth)
            .with_context(|| format!("Failed to write impulse response to: {}", path.display()))
    }
}

/// How a run ended. Cancelled and failed runs carry no partial results.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Vec<PairResult>),
    Cancelled,
    Error(String),
}

/// Runs the whole simulation on the calling thread.
///
/// `keep_going` is polled between steps, ray batches and pairs.
/// Returns `Ok(None)` when cancelled.
pub fn simulate<K>(scene: &SceneData, config: &EngineConfig, keep_going: K, hooks: &mut Hooks) -> Result<Option<Vec<PairResult>>>
where
    K: Fn() -> bool,
{
    hooks.report(State::Initialising, 0.0);
    config.validate(scene).context("Invalid engine config")?;
    let index = SpatialIndex::for_scene(scene, config.raytracer.voxel_depth, config.raytracer.voxel_padding)
        .context("Failed to build spatial index")?;
    hooks.report(State::Initialising, 1.0);

    let mut waveguide = if config.use_waveguide {
        hooks.report(State::Mesh, 0.0);
        let mut sim = WaveguideSimulator::new(config.waveguide.clone());
        let mesh = sim.build(scene, &index).context("Failed to build waveguide mesh")?;
        if let Some(callback) = hooks.node_positions.take() {
            callback(&mesh.positions());
        }
        if let Some(callback) = hooks.pressure.take() {
            sim.add_pressure_callback(callback);
        }
        hooks.report(State::Mesh, 1.0);
        Some(sim)
    } else {
        None
    };
    if !keep_going() {
        return Ok(None);
    }

    let mut raytracer = Raytracer::new(config.raytracer.clone());
    if let Some(callback) = hooks.rays.take() {
        raytracer.add_ray_callback(callback);
    }
    let postprocessor = Postprocessor::new(&config.postprocess, config.raytracer.speed_of_sound);

    let pairs = config.pairs();
    let n = pairs.len() as f64;
    let mut results = Vec::with_capacity(pairs.len());
    for (p, (source, receiver)) in pairs.into_iter().enumerate() {
        let overall = |fraction: f64| (p as f64 + fraction) / n;
        info!("Pair {} of {}: source {source}, receiver {}", p + 1, n, receiver.position);

        let waveguide_output = match waveguide.as_mut() {
            Some(sim) => {
                let steps = sim.steps_for_duration(config.duration);
                let run = sim.run(source, receiver.position, &dirac(1), steps, &keep_going, |progress| {
                    hooks.report(State::Waveguide, overall(progress.fraction()))
                });
                match run.context("Waveguide run failed")? {
                    Some(output) => Some((output, config.waveguide.crossover.min(sim.usable_bandwidth()))),
                    None => return Ok(None),
                }
            }
            None => None,
        };

        let traced = raytracer
            .run(scene, &index, source, receiver.position, &keep_going, |progress| {
                hooks.report(State::Raytrace, overall(progress.fraction()))
            })
            .context("Raytrace failed")?;
        let Some(traced) = traced else {
            return Ok(None);
        };

        hooks.report(State::Postprocess, overall(0.0));
        let band = waveguide_output.as_ref().map(|(output, crossover)| WaveguideBand {
            output,
            crossover: *crossover,
        });
        let channels = postprocessor
            .process(&traced, band, receiver.position, &receiver.capsules)
            .context("Postprocessing failed")?;
        hooks.report(State::Postprocess, overall(1.0));

        results.push(PairResult {
            source,
            receiver: receiver.position,
            channels,
            sample_rate: config.postprocess.output_sample_rate,
        });
        if !keep_going() {
            return Ok(None);
        }
    }

    hooks.report(State::Finished, 1.0);
    Ok(Some(results))
}

/// Owner of a background simulation.
///
/// Dropping the engine cancels the run and waits for the worker.
pub struct Engine {
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<Outcome>>,
}

impl Engine {
    /// Starts a run on a new worker thread.
    pub fn start(scene: SceneData, config: EngineConfig, mut hooks: Hooks) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let worker = thread::spawn(move || {
            let keep_going = || !flag.load(Ordering::Relaxed);
            match simulate(&scene, &config, keep_going, &mut hooks) {
                Ok(Some(results)) => Outcome::Success(results),
                Ok(None) => {
                    info!("Simulation cancelled");
                    Outcome::Cancelled
                }
                Err(e) => {
                    error!("Simulation failed: {e:#}");
                    Outcome::Error(format!("{e:#}"))
                }
            }
        });
        Self {
            cancel,
            worker: Some(worker),
        }
    }

    /// Asks the worker to stop at its next check.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Blocks until the worker is done.
    pub fn wait(mut self) -> Outcome {
        self.join()
    }

    fn join(&mut self) -> Outcome {
        match self.worker.take().map(JoinHandle::join) {
            Some(Ok(outcome)) => outcome,
            Some(Err(_)) => Outcome::Error("Simulation worker panicked".to_string()),
            None => Outcome::Cancelled,
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.cancel();
        self.join();
    }
}
