use serde::{Deserialize, Serialize};

use crate::Vector;

use super::WaveguideError;
use super::descriptor::{MeshDescriptor, NO_NEIGHBOR, PORTS};

/// Pressure and acoustic intensity at the receiver for one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReceiverSample {
    pub pressure: f64,
    pub intensity: Vector,
}

/// Integrates particle velocity at a mesh node from pressure gradients.
#[derive(Debug, Clone)]
pub struct Receiver {
    node: usize,
    neighbors: [usize; PORTS],
    spacing: f64,
    sample_rate: f64,
    ambient_density: f64,
    velocity: Vector,
}

impl Receiver {
    /// Fails unless the node has all six neighbours.
    pub fn new(descriptor: &MeshDescriptor, node: usize, sample_rate: f64, ambient_density: f64) -> Result<Self, WaveguideError> {
        let ports = descriptor.compute_neighbors(node);
        let found = ports.iter().filter(|&&n| n != NO_NEIGHBOR).count();
        if found != PORTS {
            return Err(WaveguideError::InsufficientNeighbors { node, found });
        }
        Ok(Self {
            node,
            neighbors: ports.map(|n| n as usize),
            spacing: descriptor.spacing,
            sample_rate,
            ambient_density,
            velocity: Vector::new(0.0, 0.0, 0.0),
        })
    }

    pub fn node(&self) -> usize {
        self.node
    }

    pub fn velocity(&self) -> Vector {
        self.velocity
    }

    pub fn reset(&mut self) {
        self.velocity = Vector::new(0.0, 0.0, 0.0);
    }

    /// Reads the newest pressures and advances the velocity by one step.
    pub fn process(&mut self, pressures: &[f64]) -> ReceiverSample {
        let pressure = pressures[self.node];
        let gradient: [f64; PORTS] = self.neighbors.map(|n| (pressures[n] - pressure) / self.spacing);
        let m = Vector::new(
            0.5 * (gradient[1] - gradient[0]),
            0.5 * (gradient[3] - gradient[2]),
            0.5 * (gradient[5] - gradient[4]),
        );
        let dv = m * (-1.0 / self.ambient_density);
        self.velocity = self.velocity + dv * (1.0 / self.sample_rate);
        ReceiverSample {
            pressure,
            intensity: self.velocity * pressure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;

    fn descriptor() -> MeshDescriptor {
        MeshDescriptor::new(Point::new(0., 0., 0.), [3, 3, 3], 0.5)
    }

    #[test]
    fn test_edge_node_rejected() {
        let d = descriptor();
        let err = Receiver::new(&d, 0, 1000.0, 1.2).unwrap_err();
        assert_eq!(err, WaveguideError::InsufficientNeighbors { node: 0, found: 3 });
    }

    #[test]
    fn test_velocity_follows_gradient() {
        let d = descriptor();
        let centre = d.compute_index([1, 1, 1]);
        let mut receiver = Receiver::new(&d, centre, 1000.0, 1.0).unwrap();
        let mut pressures = vec![0.0; d.num_nodes()];
        pressures[centre] = 0.5;
        // Pressure rising toward +x pushes air toward -x
        pressures[d.compute_index([2, 1, 1])] = 1.5;
        pressures[d.compute_index([0, 1, 1])] = 0.5;
        let sample = receiver.process(&pressures);
        assert_eq!(sample.pressure, 0.5);
        // gradient +x = 2, -x = 0 -> m.x = 1, dv.x = -1, v.x = -1e-3
        assert!((receiver.velocity().dx + 1e-3).abs() < 1e-15);
        assert!((sample.intensity.dx + 5e-4).abs() < 1e-15);
        assert!(receiver.velocity().dy.abs() < 1e-12);

        receiver.process(&pressures);
        assert!((receiver.velocity().dx + 2e-3).abs() < 1e-15);
        receiver.reset();
        assert_eq!(receiver.velocity().dx, 0.0);
    }
}
