//! Point-in-geometry test by ray parity.

use crate::geom::ray::Ray;
use crate::geom::triangles::intersect_triangle;
use crate::sim::scene::SceneData;
use crate::{Point, Vector};

use super::SpatialIndex;

/// Crossings closer than this along a ray are counted once.
const COINCIDENT_HIT_TOL: f64 = 1e-9;

/// Probe directions, tried in order until one gives an unambiguous count.
///
/// None of them is parallel to a coordinate axis or plane, so axis-aligned
/// walls are never grazed.
const PROBE_DIRECTIONS: [(f64, f64, f64); 6] = [
    (0.3421, 0.6177, 0.7083),
    (-0.5513, 0.2371, 0.8001),
    (0.7103, -0.4287, 0.5583),
    (-0.2237, -0.8119, 0.5393),
    (0.6351, 0.5519, -0.5405),
    (-0.4733, -0.3061, -0.8261),
];

/// Number of surface crossings along `ray`.
///
/// Each crossing is counted only in the voxel whose distance range contains
/// it. Returns `None` if the ray passes through an edge or a vertex, where
/// the count would be ambiguous.
pub fn count_crossings(index: &SpatialIndex, scene: &SceneData, ray: &Ray) -> Option<usize> {
    let mut hits: Vec<f64> = Vec::new();
    let degenerate = index.grid().traverse(ray, |ray, visit| {
        for &item in visit.items {
            let Some(hit) = intersect_triangle(ray, &scene.triangle_verts(item as usize)) else {
                continue;
            };
            if hit.t > visit.t_enter && hit.t <= visit.t_exit {
                if hit.is_degenerate() {
                    return Some(());
                }
                hits.push(hit.t);
            }
        }
        None
    });
    if degenerate.is_some() {
        return None;
    }

    hits.sort_by(f64::total_cmp);
    hits.dedup_by(|a, b| (*a - *b).abs() < COINCIDENT_HIT_TOL);
    Some(hits.len())
}

/// True if `p` is enclosed by the scene geometry (odd number of crossings).
///
/// Points outside the index bounds are outside.
pub fn is_inside(index: &SpatialIndex, scene: &SceneData, p: Point) -> bool {
    if !index.aabb().contains(p) {
        return false;
    }
    for &(dx, dy, dz) in &PROBE_DIRECTIONS {
        let Some(ray) = Ray::new(p, Vector::new(dx, dy, dz)) else {
            continue;
        };
        if let Some(count) = count_crossings(index, scene, &ray) {
            return count % 2 == 1;
        }
    }
    false
}
