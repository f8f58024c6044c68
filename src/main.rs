use std::path::PathBuf;

use anyhow::{Result, anyhow};
use roomverb::sim::acoustics::auralization::BitDepth;
use roomverb::sim::engine::{Hooks, State};
use roomverb::sim::materials::preset;
use roomverb::{Engine, EngineConfig, Outcome, Point, ReceiverConfig, SceneData, Vector};

fn main() -> Result<()> {
    let output = std::env::args().nth(1).map_or_else(|| PathBuf::from("roomverb.wav"), PathBuf::from);

    let concrete = *preset("concrete").ok_or_else(|| anyhow!("Missing concrete preset"))?;
    let scene = SceneData::shoebox(Point::new(0., 0., 0.), Point::new(6., 4., 3.), concrete)?;

    let mut config = EngineConfig::new();
    config.sources.push(Point::new(1.5, 2.0, 1.5));
    config.receivers.push(ReceiverConfig::binaural(
        Point::new(4.5, 2.2, 1.5),
        Vector::new(-1., 0., 0.),
        Vector::new(0., 0., 1.),
    )?);
    config.raytracer.rays = 20_000;

    let mut last: Option<(State, u32)> = None;
    let hooks = Hooks::with_progress(Box::new(move |state, fraction| {
        let decile = (10.0 * fraction) as u32;
        if last != Some((state, decile)) {
            last = Some((state, decile));
            println!("{state:?}: {}%", 10 * decile);
        }
    }));
    match Engine::start(scene, config, hooks).wait() {
        Outcome::Success(results) => {
            for result in &results {
                result.write_wav(&output, BitDepth::Int16)?;
                println!(
                    "Wrote {} channels of {} samples to {}",
                    result.channels.len(),
                    result.channels.first().map_or(0, Vec::len),
                    output.display()
                );
            }
            Ok(())
        }
        Outcome::Cancelled => Err(anyhow!("Simulation cancelled")),
        Outcome::Error(message) => Err(anyhow!(message)),
    }
}
