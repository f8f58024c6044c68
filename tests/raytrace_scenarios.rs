use anyhow::Result;
use roomverb::sim::index::SpatialIndex;
use roomverb::sim::materials::Surface;
use roomverb::sim::rays::absorption::AirAbsorption;
use roomverb::sim::rays::image_source::trace_image_source;
use roomverb::sim::rays::{Raytracer, RaytracerConfig};
use roomverb::sim::scene::Triangle;
use roomverb::{Point, SceneData};

/// 6 x 4 x 3 m room split by a thin wall at x = 3 covering y in [0, 2.5].
fn partitioned_room() -> Result<SceneData> {
    let room = SceneData::shoebox(Point::new(0., 0., 0.), Point::new(6., 4., 3.), Surface::uniform(0.6, 0.2)?)?;
    let mut vertices = room.vertices().to_vec();
    let mut triangles = room.triangles().to_vec();
    let base = vertices.len();
    vertices.extend([
        Point::new(3., 0., 0.),
        Point::new(3., 2.5, 0.),
        Point::new(3., 2.5, 3.),
        Point::new(3., 0., 3.),
    ]);
    triangles.push(Triangle::new(base, base + 1, base + 2, 0));
    triangles.push(Triangle::new(base, base + 2, base + 3, 0));
    SceneData::new(vertices, triangles, room.surfaces().to_vec())
}

fn config(rays: usize, reflections: usize) -> RaytracerConfig {
    RaytracerConfig {
        rays,
        reflections,
        seed: Some(99),
        ..RaytracerConfig::new()
    }
}

#[test]
fn test_direct_path_iff_unobstructed() -> Result<()> {
    let scene = partitioned_room()?;
    let index = SpatialIndex::for_scene(&scene, 3, 0.1)?;
    let air = AirAbsorption::standard();
    let source = Point::new(1., 1., 1.5);
    let blocked = Point::new(5., 1., 1.5);
    let open = Point::new(5., 3.5, 1.5);
    let open_source = Point::new(1., 3., 1.5);

    assert!(trace_image_source(&index, &scene, source, blocked, &[], &air, 340.0).is_none());
    assert!(trace_image_source(&index, &scene, open_source, open, &[], &air, 340.0).is_some());
    assert!(!index.point_visible(&scene, source, blocked, None));

    let mut tracer = Raytracer::new(config(2000, 6));
    let hidden = tracer.run(&scene, &index, source, blocked, || true, |_| {})?.expect("not cancelled");
    assert!(hidden.direct().is_none());
    assert!(!hidden.image_source.is_empty() || !hidden.diffuse.is_empty());

    let visible = tracer.run(&scene, &index, open_source, open, || true, |_| {})?.expect("not cancelled");
    let direct = visible.direct().expect("direct path");
    assert!((direct.time - open_source.distance(&open) / 340.0).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_parallel_planes_without_reflections() -> Result<()> {
    let vertices = vec![
        Point::new(-1000., -1000., 0.),
        Point::new(1000., -1000., 0.),
        Point::new(1000., 1000., 0.),
        Point::new(-1000., 1000., 0.),
        Point::new(-1000., -1000., 3.),
        Point::new(1000., -1000., 3.),
        Point::new(1000., 1000., 3.),
        Point::new(-1000., 1000., 3.),
    ];
    let triangles = vec![
        Triangle::new(0, 1, 2, 0),
        Triangle::new(0, 2, 3, 0),
        Triangle::new(4, 6, 5, 0),
        Triangle::new(4, 7, 6, 0),
    ];
    let scene = SceneData::new(vertices, triangles, vec![Surface::default()])?;
    let index = SpatialIndex::for_scene(&scene, 4, 0.1)?;
    let source = Point::new(0., 0., 1.);
    let receiver = Point::new(5., 2., 1.5);

    let results = Raytracer::new(config(500, 0))
        .run(&scene, &index, source, receiver, || true, |_| {})?
        .expect("not cancelled");
    let impulses = results.get_all(false);
    assert_eq!(impulses.len(), 1);
    assert!((impulses[0].time - source.distance(&receiver) / 340.0).abs() < 1e-12);
    assert!(results.get_all(true).is_empty());
    Ok(())
}
