//! From simulation results to audio channels.
//!
//! Raytracer impulses are weighted by a directional receiver, flattened into
//! per-band energy buffers and mixed down through band filters. Waveguide
//! samples are converted to pressure, resampled and joined below the
//! crossover frequency.

pub mod attenuator;
pub mod auralization;
pub mod flatten;
pub mod hrtf;
pub mod hybrid;
pub mod postprocess;

pub use attenuator::{AttenuatedImpulse, Attenuator, Hrtf, Microphone};
pub use flatten::flatten_impulses;
pub use hrtf::HrtfChannel;
pub use postprocess::{PostprocessConfig, Postprocessor, WaveguideBand};
