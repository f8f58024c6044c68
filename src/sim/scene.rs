//! Scene geometry as consumed by the simulators.
//!
//! A scene is a triangle soup: shared vertices, triangles referencing them by
//! index, and per-triangle surface indices into a list of acoustic surfaces.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::geom::bboxes::Aabb;
use crate::sim::materials::Surface;
use crate::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triangle {
    pub v0: usize,
    pub v1: usize,
    pub v2: usize,
    /// Index into [`SceneData::surfaces`].
    pub surface: usize,
}

impl Triangle {
    pub fn new(v0: usize, v1: usize, v2: usize, surface: usize) -> Self {
        Self { v0, v1, v2, surface }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneData {
    vertices: Vec<Point>,
    triangles: Vec<Triangle>,
    surfaces: Vec<Surface>,
}

impl SceneData {
    /// Creates a scene, checking that all indices are in range.
    pub fn new(vertices: Vec<Point>, triangles: Vec<Triangle>, surfaces: Vec<Surface>) -> Result<Self> {
        if surfaces.is_empty() {
            return Err(anyhow!("Scene needs at least one surface"));
        }
        for (i, t) in triangles.iter().enumerate() {
            if [t.v0, t.v1, t.v2].iter().any(|&v| v >= vertices.len()) {
                return Err(anyhow!("Triangle {i} references a missing vertex"));
            }
            if t.surface >= surfaces.len() {
                return Err(anyhow!("Triangle {i} references missing surface {}", t.surface));
            }
        }
        Ok(Self {
            vertices,
            triangles,
            surfaces,
        })
    }

    /// Closed axis-aligned box with inward-facing triangles, 2 per face.
    ///
    /// All faces use surface 0.
    pub fn shoebox(min: Point, max: Point, surface: Surface) -> Result<Self> {
        let aabb = Aabb::new(min, max);
        let (a, b) = (aabb.min, aabb.max);
        let vertices = vec![
            Point::new(a.x, a.y, a.z),
            Point::new(b.x, a.y, a.z),
            Point::new(a.x, b.y, a.z),
            Point::new(b.x, b.y, a.z),
            Point::new(a.x, a.y, b.z),
            Point::new(b.x, a.y, b.z),
            Point::new(a.x, b.y, b.z),
            Point::new(b.x, b.y, b.z),
        ];
        let quads: [[usize; 4]; 6] = [
            [0, 2, 3, 1], // floor (z = min)
            [4, 5, 7, 6], // ceiling (z = max)
            [0, 1, 5, 4], // y = min
            [2, 6, 7, 3], // y = max
            [0, 4, 6, 2], // x = min
            [1, 3, 7, 5], // x = max
        ];
        let triangles = quads
            .iter()
            .flat_map(|q| {
                [
                    Triangle::new(q[0], q[2], q[1], 0),
                    Triangle::new(q[0], q[3], q[2], 0),
                ]
            })
            .collect();
        Self::new(vertices, triangles, vec![surface])
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    /// Vertex positions of triangle `index`.
    pub fn triangle_verts(&self, index: usize) -> [Point; 3] {
        let t = &self.triangles[index];
        [self.vertices[t.v0], self.vertices[t.v1], self.vertices[t.v2]]
    }

    /// Surface of triangle `index`.
    pub fn triangle_surface(&self, index: usize) -> &Surface {
        &self.surfaces[self.triangles[index].surface]
    }

    /// Bounding box of all vertices.
    pub fn aabb(&self) -> Result<Aabb> {
        Aabb::from_points(&self.vertices).ok_or_else(|| anyhow!("Scene has no vertices"))
    }
}
