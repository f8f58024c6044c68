use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Raytracer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaytracerConfig {
    pub rays: usize,
    /// Maximum bounces per ray.
    pub reflections: usize,
    /// Longest surface sequence checked as an image source.
    pub image_source_depth: usize,
    /// Depth of the scene octree.
    pub voxel_depth: usize,
    /// Padding around the scene bounds of the octree (m).
    pub voxel_padding: f64,
    /// m/s
    pub speed_of_sound: f64,
    /// Seeds the per-ray generators. `None` draws a fresh seed per run.
    pub seed: Option<u64>,
    /// Rays traced between cancellation checks.
    pub batch_size: usize,
    /// Rays whose impulses go to the visual hooks.
    pub visual_rays: usize,
}

/// Image sources deeper than this are never checked.
pub const MAX_IMAGE_SOURCE_DEPTH: usize = 10;

impl RaytracerConfig {
    pub fn new() -> Self {
        Self {
            rays: 10_000,
            reflections: 128,
            image_source_depth: MAX_IMAGE_SOURCE_DEPTH,
            voxel_depth: 4,
            voxel_padding: 0.1,
            speed_of_sound: 340.0,
            seed: None,
            batch_size: 1000,
            visual_rays: 100,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rays == 0 {
            bail!("Raytracer needs at least one ray");
        }
        if self.speed_of_sound <= 0.0 {
            bail!("Invalid speed of sound: {}", self.speed_of_sound);
        }
        if self.image_source_depth > MAX_IMAGE_SOURCE_DEPTH {
            bail!(
                "Image source depth {} exceeds the maximum of {MAX_IMAGE_SOURCE_DEPTH}",
                self.image_source_depth
            );
        }
        Ok(())
    }

    /// Image source depth actually used, never more than the bounce count.
    pub fn effective_image_source_depth(&self) -> usize {
        self.image_source_depth.min(self.reflections)
    }
}

impl Default for RaytracerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RaytracerConfig::default();
        assert_eq!(config.rays, 10_000);
        assert_eq!(config.reflections, 128);
        assert_eq!(config.image_source_depth, 10);
        assert_eq!(config.voxel_depth, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let config = RaytracerConfig {
            rays: 0,
            ..RaytracerConfig::new()
        };
        assert!(config.validate().is_err());
        let config = RaytracerConfig {
            image_source_depth: 11,
            ..RaytracerConfig::new()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_depth() {
        let config = RaytracerConfig {
            reflections: 3,
            ..RaytracerConfig::new()
        };
        assert_eq!(config.effective_image_source_depth(), 3);
    }
}
