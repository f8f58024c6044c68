//! Room impulse responses from 3D geometry.
//!
//! Low frequencies come from a rectilinear digital waveguide mesh, high
//! frequencies from a stochastic raytracer with image-source validation.
//! Both are combined per receiver into audio channels.

pub mod geom;
pub mod sim;

// Prelude
pub use geom::point::Point;
pub use geom::vector::Vector;
pub use sim::engine::{Engine, EngineConfig, Outcome, ReceiverConfig};
pub use sim::scene::SceneData;
