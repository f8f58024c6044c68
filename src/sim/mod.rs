pub mod acoustics;
pub mod engine;
pub mod index;
pub mod materials;
pub mod rays;
pub mod scene;
pub mod waveguide;
