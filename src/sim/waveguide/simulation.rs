use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::Point;
use crate::sim::index::SpatialIndex;
use crate::sim::scene::SceneData;

use super::boundary::BoundaryState;
use super::config::WaveguideConfig;
use super::descriptor::MeshDescriptor;
use super::filters::{CanonicalCoefficients, surface_coefficients};
use super::mesh::Mesh;
use super::receiver::{Receiver, ReceiverSample};
use super::update::Sweep;
use super::{ERR_NONE, WaveguideError, describe_error_flags};

/// Fraction of the sample rate below which the mesh output is usable.
pub const USABLE_BANDWIDTH: f64 = 0.196;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveguideState {
    Uninitialised,
    Built,
    Running,
    Finished,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, Copy)]
pub struct WaveguideProgress {
    /// Completed steps (0..=num_steps).
    pub steps_done: usize,
    pub num_steps: usize,
}

impl WaveguideProgress {
    pub fn fraction(&self) -> f64 {
        if self.num_steps == 0 {
            1.0
        } else {
            self.steps_done as f64 / self.num_steps as f64
        }
    }
}

/// Receiver time series of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveguideOutput {
    pub samples: Vec<ReceiverSample>,
    pub sample_rate: f64,
    /// Position of the node the receiver was snapped to.
    pub receiver: Point,
}

impl WaveguideOutput {
    pub fn pressures(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.pressure).collect()
    }
}

/// Called with the step number and the newest pressure field.
pub type PressureCallback = Box<dyn FnMut(usize, &[f64]) + Send>;

/// Time-stepping waveguide over a scene.
pub struct WaveguideSimulator {
    config: WaveguideConfig,
    state: WaveguideState,
    mesh: Option<Mesh>,
    coefficients: Vec<CanonicalCoefficients>,
    previous: Vec<f64>,
    current: Vec<f64>,
    boundary_states: Vec<BoundaryState>,
    scratch: Vec<f64>,
    pressure_callbacks: Vec<PressureCallback>,
}

impl WaveguideSimulator {
    pub fn new(config: WaveguideConfig) -> Self {
        Self {
            config,
            state: WaveguideState::Uninitialised,
            mesh: None,
            coefficients: Vec::new(),
            previous: Vec::new(),
            current: Vec::new(),
            boundary_states: Vec::new(),
            scratch: Vec::new(),
            pressure_callbacks: Vec::new(),
        }
    }

    pub fn config(&self) -> &WaveguideConfig {
        &self.config
    }

    pub fn state(&self) -> WaveguideState {
        self.state
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        self.mesh.as_ref()
    }

    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    /// Highest frequency the mesh reproduces faithfully.
    pub fn usable_bandwidth(&self) -> f64 {
        USABLE_BANDWIDTH * self.config.sample_rate
    }

    /// Registers a visual hook for the pressure field.
    pub fn add_pressure_callback(&mut self, callback: PressureCallback) {
        self.pressure_callbacks.push(callback);
    }

    /// Builds a lattice over the scene, padded so the outer nodes sit off the walls.
    pub fn build(&mut self, scene: &SceneData, index: &SpatialIndex) -> Result<&Mesh, WaveguideError> {
        let spacing = self.config.spacing();
        let aabb = scene.aabb().map_err(|_| WaveguideError::EmptyMesh)?.padded(1.5 * spacing);
        self.build_with_descriptor(scene, index, MeshDescriptor::for_aabb(&aabb, spacing))
    }

    /// Builds the given lattice. Its spacing overrides the configured sample rate.
    pub fn build_with_descriptor(
        &mut self,
        scene: &SceneData,
        index: &SpatialIndex,
        descriptor: MeshDescriptor,
    ) -> Result<&Mesh, WaveguideError> {
        self.config.sample_rate = WaveguideConfig::sample_rate_for_spacing(self.config.speed_of_sound, descriptor.spacing);
        let mesh = match Mesh::build(scene, index, descriptor) {
            Ok(mesh) => mesh,
            Err(e) => {
                self.state = WaveguideState::Error;
                return Err(e);
            }
        };
        self.coefficients = surface_coefficients(scene.surfaces(), self.config.boundary_filter, self.config.sample_rate);
        info!(
            "Waveguide built at {:.1} Hz, usable up to {:.1} Hz",
            self.config.sample_rate,
            self.usable_bandwidth()
        );
        self.state = WaveguideState::Built;
        Ok(&*self.mesh.insert(mesh))
    }

    /// Clears pressures and filter memories.
    fn reset(&mut self) -> Result<(), WaveguideError> {
        let mesh = self.mesh.as_ref().ok_or(WaveguideError::NotBuilt)?;
        let n = mesh.descriptor().num_nodes();
        self.previous = vec![0.0; n];
        self.current = vec![0.0; n];
        self.boundary_states = mesh.boundary_states().to_vec();
        for state in &mut self.boundary_states {
            state.reset();
        }
        Ok(())
    }

    /// Advances one step, leaving the new pressures in `current`. Returns the error flags.
    fn step(&mut self) -> Result<u32, WaveguideError> {
        let mesh = self.mesh.as_ref().ok_or(WaveguideError::NotBuilt)?;
        let sweep = Sweep::new(mesh.descriptor(), mesh.condensed_nodes(), &self.coefficients);
        let flags = if self.config.parallel {
            sweep.run_parallel(
                &self.current,
                &mut self.previous,
                &mut self.boundary_states,
                mesh.boundary_owners(),
                &mut self.scratch,
            )
        } else {
            sweep.run_scalar(&self.current, &mut self.previous, &mut self.boundary_states)
        };
        std::mem::swap(&mut self.previous, &mut self.current);
        Ok(flags)
    }

    /// Runs `steps` steps with `input` injected at the source node.
    ///
    /// `keep_going` is polled once per step. Returns `Ok(None)` when cancelled.
    pub fn run<K, F>(
        &mut self,
        source: Point,
        receiver: Point,
        input: &[f64],
        steps: usize,
        keep_going: K,
        mut progress: F,
    ) -> Result<Option<WaveguideOutput>, WaveguideError>
    where
        K: Fn() -> bool,
        F: FnMut(&WaveguideProgress),
    {
        let mesh = self.mesh.as_ref().ok_or(WaveguideError::NotBuilt)?;
        let source_node = mesh
            .air_node_near(source)
            .ok_or(WaveguideError::SourceOutsideMesh(source))?;
        let receiver_node = mesh
            .air_node_near(receiver)
            .ok_or(WaveguideError::ReceiverOutsideMesh(receiver))?;
        let receiver_position = mesh.nodes()[receiver_node].position;
        let mut receiver = match Receiver::new(
            mesh.descriptor(),
            receiver_node,
            self.config.sample_rate,
            self.config.ambient_density,
        ) {
            Ok(r) => r,
            Err(e) => {
                self.state = WaveguideState::Error;
                return Err(e);
            }
        };
        debug!("Waveguide source node {source_node}, receiver node {receiver_node}, {steps} steps");

        self.reset()?;
        self.state = WaveguideState::Running;
        let mut samples = Vec::with_capacity(steps);
        for step in 0..steps {
            if !keep_going() {
                info!("Waveguide cancelled at step {step}");
                self.state = WaveguideState::Cancelled;
                return Ok(None);
            }
            if let Some(&x) = input.get(step) {
                self.current[source_node] += x;
            }
            let flags = self.step()?;
            if flags != ERR_NONE {
                warn!("Waveguide unstable at step {step}: {}", describe_error_flags(flags).join(", "));
                self.state = WaveguideState::Error;
                return Err(WaveguideError::Unstable { step, flags });
            }
            samples.push(receiver.process(&self.current));
            for callback in &mut self.pressure_callbacks {
                callback(step, &self.current);
            }
            progress(&WaveguideProgress {
                steps_done: step + 1,
                num_steps: steps,
            });
        }

        self.state = WaveguideState::Finished;
        Ok(Some(WaveguideOutput {
            samples,
            sample_rate: self.config.sample_rate,
            receiver: receiver_position,
        }))
    }

    /// Number of steps covering `duration` seconds.
    pub fn steps_for_duration(&self, duration: f64) -> usize {
        (duration * self.config.sample_rate).ceil().max(0.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::sim::materials::Surface;
    use crate::sim::waveguide::signal::dirac;

    fn room() -> (SceneData, SpatialIndex) {
        let scene = SceneData::shoebox(Point::new(0., 0., 0.), Point::new(1.2, 1.0, 0.8), Surface::default()).unwrap();
        let index = SpatialIndex::for_scene(&scene, 3, 0.1).unwrap();
        (scene, index)
    }

    fn simulator() -> WaveguideSimulator {
        WaveguideSimulator::new(WaveguideConfig {
            sample_rate: WaveguideConfig::sample_rate_for_spacing(340.0, 0.1),
            ..WaveguideConfig::new()
        })
    }

    #[test]
    fn test_states() {
        let (scene, index) = room();
        let mut sim = simulator();
        assert_eq!(sim.state(), WaveguideState::Uninitialised);
        let err = sim
            .run(Point::new(0.5, 0.5, 0.4), Point::new(0.7, 0.5, 0.4), &[1.0], 4, || true, |_| {})
            .unwrap_err();
        assert_eq!(err, WaveguideError::NotBuilt);
        sim.build(&scene, &index).unwrap();
        assert_eq!(sim.state(), WaveguideState::Built);
        let out = sim
            .run(Point::new(0.5, 0.5, 0.4), Point::new(0.7, 0.5, 0.4), &dirac(1), 20, || true, |_| {})
            .unwrap()
            .unwrap();
        assert_eq!(sim.state(), WaveguideState::Finished);
        assert_eq!(out.samples.len(), 20);
        assert!((out.sample_rate - 5889.0).abs() < 1.0);
    }

    #[test]
    fn test_impulse_reaches_receiver() {
        let (scene, index) = room();
        let mut sim = simulator();
        sim.build(&scene, &index).unwrap();
        let out = sim
            .run(Point::new(0.45, 0.45, 0.35), Point::new(0.75, 0.45, 0.35), &dirac(1), 30, || true, |_| {})
            .unwrap()
            .unwrap();
        let pressures = out.pressures();
        // Three nodes away: silent for the first steps, then nonzero
        assert_eq!(pressures[0], 0.0);
        assert_eq!(pressures[1], 0.0);
        assert!(pressures.iter().any(|p| p.abs() > 1e-6));
        assert!(pressures.iter().all(|p| p.abs() <= 1.0));
    }

    #[test]
    fn test_cancel() {
        let (scene, index) = room();
        let mut sim = simulator();
        sim.build(&scene, &index).unwrap();
        let polls = AtomicUsize::new(0);
        let out = sim
            .run(
                Point::new(0.5, 0.5, 0.4),
                Point::new(0.7, 0.5, 0.4),
                &dirac(1),
                100,
                || polls.fetch_add(1, Ordering::SeqCst) < 5,
                |_| {},
            )
            .unwrap();
        assert!(out.is_none());
        assert_eq!(sim.state(), WaveguideState::Cancelled);
    }

    #[test]
    fn test_receiver_outside() {
        let (scene, index) = room();
        let mut sim = simulator();
        sim.build(&scene, &index).unwrap();
        let err = sim
            .run(Point::new(0.5, 0.5, 0.4), Point::new(3.0, 0.5, 0.4), &dirac(1), 10, || true, |_| {})
            .unwrap_err();
        assert_eq!(err, WaveguideError::ReceiverOutsideMesh(Point::new(3.0, 0.5, 0.4)));
    }

    #[test]
    fn test_callbacks_and_progress() {
        let (scene, index) = room();
        let mut sim = simulator();
        sim.build(&scene, &index).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        sim.add_pressure_callback(Box::new(move |step, field| {
            sink.lock().unwrap().push((step, field.len()));
        }));
        let mut last = 0.0;
        sim.run(Point::new(0.5, 0.5, 0.4), Point::new(0.7, 0.5, 0.4), &dirac(1), 5, || true, |p| {
            last = p.fraction();
        })
        .unwrap();
        let n = sim.mesh().unwrap().descriptor().num_nodes();
        assert_eq!(*seen.lock().unwrap(), (0..5).map(|s| (s, n)).collect::<Vec<_>>());
        assert_eq!(last, 1.0);
    }

    #[test]
    fn test_scalar_and_parallel_runs_agree() {
        let (scene, index) = room();
        let mut parallel = simulator();
        let mut scalar = WaveguideSimulator::new(WaveguideConfig {
            parallel: false,
            ..parallel.config().clone()
        });
        parallel.build(&scene, &index).unwrap();
        scalar.build(&scene, &index).unwrap();
        let run = |sim: &mut WaveguideSimulator| {
            sim.run(Point::new(0.5, 0.5, 0.4), Point::new(0.7, 0.3, 0.4), &dirac(1), 60, || true, |_| {})
                .unwrap()
                .unwrap()
        };
        let a = run(&mut parallel);
        let b = run(&mut scalar);
        for (x, y) in a.samples.iter().zip(&b.samples) {
            assert!((x.pressure - y.pressure).abs() < 1e-12);
        }
    }
}
