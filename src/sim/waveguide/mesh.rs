use log::{debug, info};
use rayon::prelude::*;

use crate::Point;
use crate::geom::triangles::distance_to_triangle;
use crate::sim::index::SpatialIndex;
use crate::sim::index::inside::is_inside;
use crate::sim::scene::SceneData;

use super::WaveguideError;
use super::boundary::{
    BT_INSIDE, BT_NONE, BT_REENTRANT, BoundaryState, FACE_BITS, compute_boundary_type,
};
use super::descriptor::{Locator, MeshDescriptor, NO_NEIGHBOR, PORTS};

/// `boundary_index` of nodes that own no filter state.
pub const NO_BOUNDARY: u32 = u32::MAX;

/// Lattice point as produced by the mesh builder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshNode {
    pub ports: [u32; PORTS],
    pub position: Point,
    pub inside: bool,
    pub boundary_type: u32,
    pub boundary_index: u32,
    /// Surface of the nearest triangle; only meaningful for boundary nodes.
    pub coefficient_index: usize,
}

impl MeshNode {
    /// Number of exposed directions of a face, edge or corner node, else 0.
    pub fn boundary_arity(&self) -> u32 {
        if self.inside || self.boundary_type == BT_REENTRANT {
            0
        } else {
            (self.boundary_type & FACE_BITS).count_ones()
        }
    }
}

/// Node data read by the update sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CondensedNode {
    /// Boundary bits, plus [`BT_INSIDE`] for air nodes.
    pub boundary_type: u32,
    pub boundary_index: u32,
}

impl From<&MeshNode> for CondensedNode {
    fn from(n: &MeshNode) -> Self {
        Self {
            boundary_type: n.boundary_type | if n.inside { BT_INSIDE } else { BT_NONE },
            boundary_index: n.boundary_index,
        }
    }
}

/// Classified waveguide lattice of a scene.
#[derive(Debug, Clone)]
pub struct Mesh {
    descriptor: MeshDescriptor,
    nodes: Vec<MeshNode>,
    condensed: Vec<CondensedNode>,
    boundary_states: Vec<BoundaryState>,
    boundary_owners: Vec<usize>,
}

impl Mesh {
    /// Builds and classifies the lattice described by `descriptor`.
    pub fn build(scene: &SceneData, index: &SpatialIndex, descriptor: MeshDescriptor) -> Result<Self, WaveguideError> {
        let num_nodes = descriptor.num_nodes();
        if num_nodes == 0 {
            return Err(WaveguideError::EmptyMesh);
        }
        info!(
            "Building waveguide mesh {}x{}x{} ({num_nodes} nodes, spacing {:.4} m)",
            descriptor.dims[0], descriptor.dims[1], descriptor.dims[2], descriptor.spacing
        );

        let positions: Vec<Point> = (0..num_nodes)
            .into_par_iter()
            .map(|i| descriptor.compute_position(descriptor.compute_locator(i)))
            .collect();
        let ports: Vec<[u32; PORTS]> = (0..num_nodes)
            .into_par_iter()
            .map(|i| descriptor.compute_neighbors(i))
            .collect();

        let raw_inside: Vec<bool> = positions.par_iter().map(|&p| is_inside(index, scene, p)).collect();
        // Isolated inside nodes cannot carry a wave
        let inside: Vec<bool> = (0..num_nodes)
            .into_par_iter()
            .map(|i| {
                raw_inside[i]
                    && ports[i]
                        .iter()
                        .any(|&n| n != NO_NEIGHBOR && raw_inside[n as usize])
            })
            .collect();

        let boundary_types: Vec<u32> = (0..num_nodes)
            .into_par_iter()
            .map(|i| {
                if inside[i] {
                    BT_NONE
                } else {
                    compute_boundary_type(&descriptor, &inside, descriptor.compute_locator(i))
                }
            })
            .collect();

        let mut nodes: Vec<MeshNode> = (0..num_nodes)
            .into_par_iter()
            .map(|i| {
                let mut node = MeshNode {
                    ports: ports[i],
                    position: positions[i],
                    inside: inside[i],
                    boundary_type: boundary_types[i],
                    boundary_index: NO_BOUNDARY,
                    coefficient_index: 0,
                };
                if node.boundary_arity() > 0 {
                    node.coefficient_index = coefficient_index_for_position(scene, index, node.position);
                }
                node
            })
            .collect();

        let mut boundary_states = Vec::new();
        let mut boundary_owners = Vec::new();
        for (i, node) in nodes.iter_mut().enumerate() {
            if let Some(state) = BoundaryState::for_bits(node.boundary_arity(), node.coefficient_index) {
                node.boundary_index = boundary_states.len() as u32;
                boundary_states.push(state);
                boundary_owners.push(i);
            }
        }

        let condensed = nodes.iter().map(CondensedNode::from).collect();
        let mesh = Self {
            descriptor,
            nodes,
            condensed,
            boundary_states,
            boundary_owners,
        };
        debug!(
            "Mesh has {} air nodes, {} boundary nodes, {} reentrant nodes",
            mesh.num_inside(),
            mesh.boundary_states.len(),
            mesh.num_reentrant()
        );
        Ok(mesh)
    }

    pub fn descriptor(&self) -> &MeshDescriptor {
        &self.descriptor
    }

    pub fn nodes(&self) -> &[MeshNode] {
        &self.nodes
    }

    pub fn condensed_nodes(&self) -> &[CondensedNode] {
        &self.condensed
    }

    /// Initial (zeroed) boundary filter states, one per boundary node.
    pub fn boundary_states(&self) -> &[BoundaryState] {
        &self.boundary_states
    }

    /// Node index owning each boundary state.
    pub fn boundary_owners(&self) -> &[usize] {
        &self.boundary_owners
    }

    pub fn num_inside(&self) -> usize {
        self.nodes.iter().filter(|n| n.inside).count()
    }

    pub fn num_reentrant(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| !n.inside && n.boundary_type == BT_REENTRANT)
            .count()
    }

    /// Node positions, for visualisation.
    pub fn positions(&self) -> Vec<Point> {
        self.nodes.iter().map(|n| n.position).collect()
    }

    /// Index of the air node nearest to `p`.
    ///
    /// Fails if `p` is more than one spacing away from the lattice or the
    /// nearest node is not air.
    pub fn air_node_near(&self, p: Point) -> Option<usize> {
        let loc: Locator = self.descriptor.compute_locator_for_position(p);
        let index = self.descriptor.compute_index(loc);
        let node = &self.nodes[index];
        (node.inside && node.position.distance(&p) <= self.descriptor.spacing).then_some(index)
    }
}

/// Surface index of the triangle nearest to `p`.
///
/// Searches the voxel containing `p` first and falls back to all triangles.
fn coefficient_index_for_position(scene: &SceneData, index: &SpatialIndex, p: Point) -> usize {
    let nearest = |candidates: &mut dyn Iterator<Item = usize>| {
        candidates
            .map(|t| (t, distance_to_triangle(p, &scene.triangle_verts(t))))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(t, _)| t)
    };
    let local = index
        .items_at(p)
        .and_then(|items| nearest(&mut items.iter().map(|&i| i as usize)));
    local
        .or_else(|| nearest(&mut (0..scene.triangles().len())))
        .map_or(0, |t| scene.triangles()[t].surface)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::bboxes::Aabb;
    use crate::sim::materials::Surface;
    use crate::sim::scene::Triangle;

    fn box_mesh() -> (SceneData, Mesh) {
        let scene = SceneData::shoebox(
            Point::new(0., 0., 0.),
            Point::new(1., 0.8, 0.6),
            Surface::default(),
        )
        .unwrap();
        let index = SpatialIndex::for_scene(&scene, 3, 0.5).unwrap();
        let spacing = 0.1;
        let aabb = scene.aabb().unwrap().padded(1.5 * spacing);
        let descriptor = MeshDescriptor::for_aabb(&aabb, spacing);
        let mesh = Mesh::build(&scene, &index, descriptor).unwrap();
        (scene, mesh)
    }

    #[test]
    fn test_convex_box_classification() {
        let (scene, mesh) = box_mesh();
        let aabb = scene.aabb().unwrap();
        let shrunk = Aabb::new(aabb.min + crate::Vector::new(0.01, 0.01, 0.01), aabb.max - crate::Vector::new(0.01, 0.01, 0.01));
        for node in mesh.nodes() {
            if shrunk.contains(node.position) {
                assert!(node.inside, "{} should be inside", node.position);
            } else if !aabb.padded(0.01).contains(node.position) {
                assert!(!node.inside, "{} should be outside", node.position);
            }
            if !node.inside && node.boundary_type != BT_NONE {
                let bits = (node.boundary_type & FACE_BITS).count_ones();
                assert!((1..=3).contains(&bits));
                assert_ne!(node.boundary_type, BT_REENTRANT);
            }
        }
        assert_eq!(mesh.num_reentrant(), 0);
    }

    #[test]
    fn test_boundary_states_match_arity() {
        let (_, mesh) = box_mesh();
        assert!(!mesh.boundary_states().is_empty());
        for (state, &owner) in mesh.boundary_states().iter().zip(mesh.boundary_owners()) {
            let node = &mesh.nodes()[owner];
            assert_eq!(state.data().len() as u32, node.boundary_arity());
            assert_eq!(mesh.boundary_states()[node.boundary_index as usize], *state);
        }
        let with_state = mesh.nodes().iter().filter(|n| n.boundary_index != NO_BOUNDARY).count();
        assert_eq!(with_state, mesh.boundary_states().len());
        // Each box face, edge and corner is represented
        for bits in 1..=3 {
            assert!(mesh.nodes().iter().any(|n| n.boundary_arity() == bits));
        }
    }

    #[test]
    fn test_condensed_nodes() {
        let (_, mesh) = box_mesh();
        for (node, condensed) in mesh.nodes().iter().zip(mesh.condensed_nodes()) {
            assert_eq!(condensed.boundary_type & BT_INSIDE != 0, node.inside);
            assert_eq!(condensed.boundary_index, node.boundary_index);
        }
    }

    #[test]
    fn test_air_node_near() {
        let (_, mesh) = box_mesh();
        let index = mesh.air_node_near(Point::new(0.5, 0.4, 0.3)).unwrap();
        assert!(mesh.nodes()[index].position.distance(&Point::new(0.5, 0.4, 0.3)) < 0.1);
        assert!(mesh.air_node_near(Point::new(5.0, 0.4, 0.3)).is_none());
    }

    #[test]
    fn test_coefficient_index_from_nearest_surface() {
        let verts = vec![
            Point::new(0., 0., 0.),
            Point::new(1., 0., 0.),
            Point::new(0., 1., 0.),
            Point::new(0., 0., 5.),
            Point::new(1., 0., 5.),
            Point::new(0., 1., 5.),
        ];
        let scene = SceneData::new(
            verts,
            vec![Triangle::new(0, 1, 2, 0), Triangle::new(3, 4, 5, 1)],
            vec![Surface::default(), Surface::uniform(0.1, 0.1).unwrap()],
        )
        .unwrap();
        let index = SpatialIndex::for_scene(&scene, 2, 0.1).unwrap();
        assert_eq!(coefficient_index_for_position(&scene, &index, Point::new(0.2, 0.2, 0.3)), 0);
        assert_eq!(coefficient_index_for_position(&scene, &index, Point::new(0.2, 0.2, 4.6)), 1);
        // Far from everything
        assert_eq!(coefficient_index_for_position(&scene, &index, Point::new(0.2, 0.2, 3.5)), 1);
    }
}
