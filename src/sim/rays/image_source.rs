//! Validation of specular paths by the image source method.

use crate::Point;
use crate::geom::ray::Ray;
use crate::geom::triangles::mirror_point;
use crate::sim::index::SpatialIndex;
use crate::sim::materials::{Bands, NUM_BANDS};
use crate::sim::scene::SceneData;

use super::Impulse;
use super::absorption::{AbsorptionModel, AirAbsorption, SpecularAbsorption};

/// Ordered triangle indices of a specular path. The empty key is the direct path.
pub type PathKey = Vec<usize>;

/// Successive mirror images of `source` in the planes of `path`.
pub fn image_sources(scene: &SceneData, source: Point, path: &[usize]) -> Option<Vec<Point>> {
    let mut images = Vec::with_capacity(path.len());
    let mut image = source;
    for &triangle in path {
        image = mirror_point(image, &scene.triangle_verts(triangle))?;
        images.push(image);
    }
    Some(images)
}

/// Reflection points of `path` if it is a real specular path from
/// `source` to `receiver`, ordered from the source side.
pub fn reflection_points(
    index: &SpatialIndex,
    scene: &SceneData,
    source: Point,
    receiver: Point,
    path: &[usize],
) -> Option<Vec<Point>> {
    let images = image_sources(scene, source, path)?;
    let mut points = Vec::with_capacity(path.len());
    let mut current = receiver;
    let mut avoid = None;
    // Walk back from the receiver towards each image in turn
    for (&triangle, &image) in path.iter().zip(&images).rev() {
        let ray = Ray::from_points(current, image)?;
        let hit = index.intersect(scene, &ray, avoid)?;
        if hit.triangle != triangle || hit.distance >= current.distance(&image) {
            return None;
        }
        current = ray.point_at(hit.distance);
        points.push(current);
        avoid = Some(triangle);
    }
    if !index.point_visible(scene, current, source, avoid) {
        return None;
    }
    points.reverse();
    Some(points)
}

/// Impulse of a specular path, or `None` if the path is blocked or invalid.
pub fn trace_image_source(
    index: &SpatialIndex,
    scene: &SceneData,
    source: Point,
    receiver: Point,
    path: &[usize],
    air: &AirAbsorption,
    speed_of_sound: f64,
) -> Option<Impulse> {
    let points = reflection_points(index, scene, source, receiver, path)?;
    // Path length equals the distance to the last image
    let distance = match image_sources(scene, source, path)?.last() {
        Some(image) => receiver.distance(image),
        None => receiver.distance(&source),
    };
    let unit: Bands = [1.0; NUM_BANDS];
    let energy = path.iter().fold(unit, |energy, &triangle| {
        SpecularAbsorption.apply(&energy, scene.triangle_surface(triangle))
    });
    let position = points.last().copied().unwrap_or(source);
    Some(Impulse::new(air.apply(&energy, distance), position, distance / speed_of_sound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::materials::Surface;

    fn room() -> (SceneData, SpatialIndex) {
        let scene = SceneData::shoebox(Point::new(0., 0., 0.), Point::new(4., 3., 2.5), Surface::uniform(0.5, 0.1).unwrap()).unwrap();
        let index = SpatialIndex::for_scene(&scene, 3, 0.1).unwrap();
        (scene, index)
    }

    /// Triangles of the shoebox lying in the plane `axis = value`.
    fn wall(scene: &SceneData, axis: usize, value: f64) -> Vec<usize> {
        (0..scene.triangles().len())
            .filter(|&t| scene.triangle_verts(t).iter().all(|v| (v.coord(axis) - value).abs() < 1e-9))
            .collect()
    }

    #[test]
    fn test_direct_path() {
        let (scene, index) = room();
        let air = AirAbsorption::standard();
        let source = Point::new(1., 1., 1.);
        let receiver = Point::new(3., 1., 1.);
        let impulse = trace_image_source(&index, &scene, source, receiver, &[], &air, 340.0).unwrap();
        assert!((impulse.time - 2.0 / 340.0).abs() < 1e-12);
        assert_eq!(impulse.position, source);
        assert!((impulse.volume[0] - air.attenuation(2.0)[0]).abs() < 1e-12);
    }

    #[test]
    fn test_floor_reflection() {
        let (scene, index) = room();
        let air = AirAbsorption::standard();
        let source = Point::new(1., 1., 1.);
        let receiver = Point::new(3., 1., 1.);
        let floor = wall(&scene, 2, 0.0);
        assert_eq!(floor.len(), 2);
        // The reflection point (2, 1, 0) lies in exactly one of the two floor triangles
        let valid: Vec<Impulse> = floor
            .iter()
            .filter_map(|&t| trace_image_source(&index, &scene, source, receiver, &[t], &air, 340.0))
            .collect();
        assert_eq!(valid.len(), 1);
        let expected = (4.0f64 + 4.0).sqrt();
        assert!((valid[0].time - expected / 340.0).abs() < 1e-12);
        assert!(valid[0].position.is_close(&Point::new(2., 1., 0.)));
        assert!((valid[0].volume[3] - 0.5 * air.attenuation(expected)[3]).abs() < 1e-12);
    }

    #[test]
    fn test_wrong_wall_rejected() {
        let (scene, index) = room();
        let air = AirAbsorption::standard();
        let ceiling = wall(&scene, 2, 2.5);
        let floor = wall(&scene, 2, 0.0);
        let source = Point::new(1., 1., 1.);
        let receiver = Point::new(3., 1., 1.);
        // Floor then floor again is not a specular path
        for &a in &floor {
            for &b in &floor {
                assert!(trace_image_source(&index, &scene, source, receiver, &[a, b], &air, 340.0).is_none());
            }
        }
        // Floor then ceiling is
        let count = floor
            .iter()
            .flat_map(|&a| ceiling.iter().map(move |&b| [a, b]))
            .filter(|p| trace_image_source(&index, &scene, source, receiver, p, &air, 340.0).is_some())
            .count();
        assert_eq!(count, 1);
    }
}
