use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result, bail};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::sim::acoustics::{Attenuator, Hrtf, HrtfChannel, PostprocessConfig};
use crate::sim::rays::RaytracerConfig;
use crate::sim::scene::SceneData;
use crate::sim::waveguide::WaveguideConfig;
use crate::{Point, Vector};

/// A listening position with one output channel per capsule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub position: Point,
    #[serde(default = "omni_capsule")]
    pub capsules: Vec<Attenuator>,
}

fn omni_capsule() -> Vec<Attenuator> {
    vec![Attenuator::default()]
}

impl ReceiverConfig {
    pub fn omni(position: Point) -> Self {
        Self {
            position,
            capsules: omni_capsule(),
        }
    }

    /// Left and right ears of a head at `position`.
    pub fn binaural(position: Point, facing: Vector, up: Vector) -> Result<Self> {
        Ok(Self {
            position,
            capsules: vec![
                Attenuator::Hrtf(Hrtf::new(facing, up, HrtfChannel::Left)?),
                Attenuator::Hrtf(Hrtf::new(facing, up, HrtfChannel::Right)?),
            ],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sources: Vec<Point>,
    pub receivers: Vec<ReceiverConfig>,
    /// Run the waveguide for the low band. Without it the raytracer covers all bands.
    pub use_waveguide: bool,
    pub waveguide: WaveguideConfig,
    pub raytracer: RaytracerConfig,
    pub postprocess: PostprocessConfig,
    /// Length of the waveguide run in seconds.
    pub duration: f64,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            receivers: Vec::new(),
            use_waveguide: true,
            waveguide: WaveguideConfig::new(),
            raytracer: RaytracerConfig::new(),
            postprocess: PostprocessConfig::new(),
            duration: 0.5,
        }
    }

    /// Source/receiver pairs in processing order.
    pub fn pairs(&self) -> Vec<(Point, &ReceiverConfig)> {
        self.sources
            .iter()
            .flat_map(|&s| self.receivers.iter().map(move |r| (s, r)))
            .collect()
    }

    /// Checks the settings against each other and against the scene bounds.
    pub fn validate(&self, scene: &SceneData) -> Result<()> {
        if self.sources.is_empty() || self.receivers.is_empty() {
            bail!("At least one source and one receiver are needed");
        }
        if self.use_waveguide && !(self.duration > 0.0) {
            bail!("Waveguide duration must be positive, got {}", self.duration);
        }
        self.raytracer.validate()?;
        self.postprocess.validate()?;
        if (self.raytracer.speed_of_sound - self.waveguide.speed_of_sound).abs() > 1e-9 {
            warn!(
                "Raytracer and waveguide speeds of sound differ ({} vs {})",
                self.raytracer.speed_of_sound, self.waveguide.speed_of_sound
            );
        }
        let aabb = scene.aabb()?;
        for &source in &self.sources {
            if !aabb.contains(source) {
                bail!("Source {source} is outside the scene");
            }
        }
        for receiver in &self.receivers {
            if !aabb.contains(receiver.position) {
                bail!("Receiver {} is outside the scene", receiver.position);
            }
            if receiver.capsules.is_empty() {
                bail!("Receiver {} has no capsules", receiver.position);
            }
            for (i, capsule) in receiver.capsules.iter().enumerate() {
                capsule
                    .validate()
                    .with_context(|| format!("Invalid capsule {i} of receiver {}", receiver.position))?;
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize engine config from string")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize engine config to string")
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to deserialize engine config from: {}", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Failed to create file: {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("Failed to serialize engine config to: {}", path.display()))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::acoustics::Microphone;
    use crate::sim::materials::Surface;

    fn config() -> EngineConfig {
        EngineConfig {
            sources: vec![Point::new(1., 1., 1.)],
            receivers: vec![ReceiverConfig::omni(Point::new(2., 2., 1.))],
            ..EngineConfig::new()
        }
    }

    #[test]
    fn test_json_round_trip() -> Result<()> {
        let mut config = config();
        config.receivers.push(ReceiverConfig::binaural(
            Point::new(2., 1., 1.),
            Vector::new(1., 0., 0.),
            Vector::new(0., 0., 1.),
        )?);
        config.receivers[0].capsules = vec![Attenuator::Microphone(Microphone::new(Vector::new(0., 1., 0.), 0.5)?)];
        let back = EngineConfig::from_json(&config.to_json()?)?;
        assert_eq!(back, config);
        Ok(())
    }

    #[test]
    fn test_json_defaults() -> Result<()> {
        let config = EngineConfig::from_json(
            r#"{"sources": [{"x": 1.0, "y": 1.0, "z": 1.0}],
                "receivers": [{"position": {"x": 2.0, "y": 1.0, "z": 1.0}}],
                "raytracer": {"rays": 50}}"#,
        )?;
        assert_eq!(config.receivers[0].capsules, vec![Attenuator::default()]);
        assert_eq!(config.raytracer.rays, 50);
        assert_eq!(config.raytracer.reflections, RaytracerConfig::new().reflections);
        assert!(config.use_waveguide);
        assert!(EngineConfig::from_json("{\"duration\": \"long\"}").is_err());
        Ok(())
    }

    #[test]
    fn test_json_rejects_out_of_range_capsule() {
        let result = EngineConfig::from_json(
            r#"{"sources": [{"x": 1.0, "y": 1.0, "z": 1.0}],
                "receivers": [{"position": {"x": 2.0, "y": 1.0, "z": 1.0},
                               "capsules": [{"type": "Microphone",
                                             "pointing": {"dx": 5.0, "dy": 0.0, "dz": 0.0},
                                             "shape": 3.0}]}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_file_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("engine.json");
        config().write(&path)?;
        assert_eq!(EngineConfig::read(&path)?, config());
        assert!(EngineConfig::read(&dir.path().join("missing.json")).is_err());
        Ok(())
    }

    #[test]
    fn test_validate() -> Result<()> {
        let scene = SceneData::shoebox(Point::new(0., 0., 0.), Point::new(3., 3., 2.), Surface::default())?;
        assert!(config().validate(&scene).is_ok());
        let mut outside = config();
        outside.sources[0] = Point::new(5., 1., 1.);
        assert!(outside.validate(&scene).is_err());
        let mut empty = config();
        empty.receivers.clear();
        assert!(empty.validate(&scene).is_err());
        let mut deaf = config();
        deaf.receivers[0].capsules.clear();
        assert!(deaf.validate(&scene).is_err());
        let mut skewed = config();
        skewed.receivers[0].capsules = vec![Attenuator::Microphone(Microphone {
            pointing: Vector::new(5., 0., 0.),
            shape: 3.0,
        })];
        assert!(skewed.validate(&scene).is_err());
        Ok(())
    }

    #[test]
    fn test_pairs_order() {
        let mut config = config();
        config.sources.push(Point::new(1.5, 1., 1.));
        config.receivers.push(ReceiverConfig::omni(Point::new(2.5, 2., 1.)));
        let pairs = config.pairs();
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[1].0, Point::new(1., 1., 1.));
        assert_eq!(pairs[1].1.position, Point::new(2.5, 2., 1.));
    }
}
