use crate::Point;
use crate::geom::bboxes::Aabb;
use crate::geom::ray::Ray;
use crate::geom::triangles::intersect_triangle;
use crate::sim::scene::SceneData;

use super::{NodeKind, Octree, SpatialIndex};

/// Dense grid of octree leaves.
///
/// `data` holds one offset per voxel (`side^3` words, row-major with x fastest)
/// followed by the voxel records, each a count and that many item indices.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    aabb: Aabb,
    side: usize,
    data: Vec<u32>,
}

/// A voxel reached by [`VoxelGrid::traverse`].
#[derive(Debug, Clone, Copy)]
pub struct VoxelVisit<'a> {
    pub locator: [usize; 3],
    pub items: &'a [u32],
    /// Ray distance at which the voxel is entered.
    pub t_enter: f64,
    /// Ray distance at which the voxel is left.
    pub t_exit: f64,
}

/// Nearest triangle hit along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub triangle: usize,
    pub distance: f64,
}

impl VoxelGrid {
    pub fn from_tree(tree: &Octree) -> Self {
        let aabb = tree.root().region;
        let side = tree.get_side();
        let voxels = side * side * side;
        let vd = aabb.dimensions() * (1.0 / side as f64);

        let mut data = vec![0u32; voxels];
        for index in 0..voxels {
            let loc = [index % side, (index / side) % side, index / (side * side)];
            let centre = Point::new(
                aabb.min.x + (loc[0] as f64 + 0.5) * vd.dx,
                aabb.min.y + (loc[1] as f64 + 0.5) * vd.dy,
                aabb.min.z + (loc[2] as f64 + 0.5) * vd.dz,
            );
            data[index] = data.len() as u32;
            match &tree.surrounding_leaf(centre).kind {
                NodeKind::Leaf(items) => {
                    data.push(items.len() as u32);
                    data.extend_from_slice(items);
                }
                NodeKind::Internal(_) => data.push(0),
            }
        }
        Self { aabb, side, data }
    }

    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    pub fn side(&self) -> usize {
        self.side
    }

    /// Flat buffer of voxel offsets and records.
    pub fn data(&self) -> &[u32] {
        &self.data
    }

    pub fn items(&self, locator: [usize; 3]) -> &[u32] {
        let index = locator[0] + locator[1] * self.side + locator[2] * self.side * self.side;
        let offset = self.data[index] as usize;
        let count = self.data[offset] as usize;
        &self.data[offset + 1..offset + 1 + count]
    }

    /// Voxel containing `p`, or `None` outside the grid.
    pub fn locator_for(&self, p: Point) -> Option<[usize; 3]> {
        let dims = self.aabb.dimensions();
        let mut loc = [0; 3];
        for axis in 0..3 {
            let rel = (p.coord(axis) - self.aabb.min.coord(axis)) / dims.component(axis);
            let i = (rel * self.side as f64).floor();
            if !(0.0..self.side as f64).contains(&i) {
                return None;
            }
            loc[axis] = i as usize;
        }
        Some(loc)
    }

    /// Walks the voxels pierced by `ray` in order of distance (Amanatides-Woo).
    ///
    /// The callback is invoked once per voxel and the walk stops at the first
    /// `Some` it returns. Rays starting outside the grid visit nothing.
    pub fn traverse<T, F>(&self, ray: &Ray, mut callback: F) -> Option<T>
    where
        F: FnMut(&Ray, &VoxelVisit<'_>) -> Option<T>,
    {
        let side = self.side as i64;
        let dims = self.aabb.dimensions();
        let mut ind = [0i64; 3];
        let mut step = [0i64; 3];
        let mut just_out = [0i64; 3];
        let mut t_max = [0.0f64; 3];
        let mut t_delta = [0.0f64; 3];

        for axis in 0..3 {
            let vd = dims.component(axis) / self.side as f64;
            let min = self.aabb.min.coord(axis);
            let origin = ray.origin.coord(axis);
            let dir = ray.direction.component(axis);

            let i = ((origin - min) / vd).floor();
            if !(0.0..self.side as f64).contains(&i) {
                return None;
            }
            ind[axis] = i as i64;

            let negative = dir.is_sign_negative();
            step[axis] = if negative { -1 } else { 1 };
            just_out[axis] = if negative { -1 } else { side };
            let boundary = min + (ind[axis] + i64::from(!negative)) as f64 * vd;
            let t = ((boundary - origin) / dir).abs();
            t_max[axis] = if t.is_nan() { f64::INFINITY } else { t };
            t_delta[axis] = (vd / dir).abs();
        }

        let mut t_enter = 0.0;
        loop {
            let axis = if t_max[0] < t_max[1] {
                if t_max[0] < t_max[2] { 0 } else { 2 }
            } else if t_max[1] < t_max[2] {
                1
            } else {
                2
            };

            let locator = [ind[0] as usize, ind[1] as usize, ind[2] as usize];
            let visit = VoxelVisit {
                locator,
                items: self.items(locator),
                t_enter,
                t_exit: t_max[axis],
            };
            if let Some(found) = callback(ray, &visit) {
                return Some(found);
            }

            ind[axis] += step[axis];
            if ind[axis] == just_out[axis] {
                return None;
            }
            t_enter = t_max[axis];
            t_max[axis] += t_delta[axis];
        }
    }
}

impl SpatialIndex {
    /// Nearest triangle hit by `ray`, skipping `avoid`.
    pub fn intersect(&self, scene: &SceneData, ray: &Ray, avoid: Option<usize>) -> Option<Intersection> {
        self.grid().traverse(ray, |ray, visit| {
            let mut nearest: Option<Intersection> = None;
            for &item in visit.items {
                let triangle = item as usize;
                if avoid == Some(triangle) {
                    continue;
                }
                if let Some(hit) = intersect_triangle(ray, &scene.triangle_verts(triangle))
                    && nearest.is_none_or(|n| hit.t < n.distance)
                {
                    nearest = Some(Intersection {
                        triangle,
                        distance: hit.t,
                    });
                }
            }
            // A hit beyond this voxel may be beaten by one in a later voxel
            nearest.filter(|n| n.distance <= visit.t_exit)
        })
    }

    /// True if nothing in the scene blocks the segment between `from` and `to`.
    ///
    /// `avoid` is typically the triangle `from` lies on.
    pub fn point_visible(&self, scene: &SceneData, from: Point, to: Point, avoid: Option<usize>) -> bool {
        let Some(ray) = Ray::from_points(from, to) else {
            return true;
        };
        let distance = from.distance(&to);
        match self.intersect(scene, &ray, avoid) {
            Some(hit) => hit.distance >= distance,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vector;
    use crate::sim::materials::Surface;

    fn cube_index(depth: usize) -> (SceneData, SpatialIndex) {
        let scene = SceneData::shoebox(
            Point::new(0., 0., 0.),
            Point::new(1., 1., 1.),
            Surface::default(),
        )
        .unwrap();
        let index = SpatialIndex::for_scene(&scene, depth, 0.0).unwrap();
        (scene, index)
    }

    #[test]
    fn test_grid_matches_tree_leaves() {
        let (_, index) = cube_index(2);
        let grid = index.grid();
        assert_eq!(grid.side(), 4);
        for x in 0..4 {
            for y in 0..4 {
                for z in 0..4 {
                    let inner = (1..3).contains(&x) && (1..3).contains(&y) && (1..3).contains(&z);
                    assert_eq!(grid.items([x, y, z]).is_empty(), inner, "voxel {x},{y},{z}");
                }
            }
        }
    }

    #[test]
    fn test_locator_for() {
        let (_, index) = cube_index(2);
        let grid = index.grid();
        assert_eq!(grid.locator_for(Point::new(0.1, 0.3, 0.9)), Some([0, 1, 3]));
        assert_eq!(grid.locator_for(Point::new(1.5, 0.3, 0.9)), None);
        assert_eq!(grid.locator_for(Point::new(-0.1, 0.3, 0.9)), None);
    }

    #[test]
    fn test_traverse_increasing_order() {
        let (_, index) = cube_index(3);
        let ray = Ray::new(Point::new(0.05, 0.07, 0.11), Vector::new(0.7, 0.5, 0.3)).unwrap();
        let mut visits: Vec<([usize; 3], f64, f64)> = Vec::new();
        let stopped: Option<()> = index.grid().traverse(&ray, |_, v| {
            visits.push((v.locator, v.t_enter, v.t_exit));
            None
        });
        assert!(stopped.is_none());
        assert!(visits.len() > 3);
        assert_eq!(visits[0].0, [0, 0, 0]);
        for w in visits.windows(2) {
            // Entered where the previous voxel was left
            assert!((w[1].1 - w[0].2).abs() < 1e-12);
            assert!(w[1].1 >= w[0].1);
            // Face neighbours, one unit along one axis
            let diff: usize = (0..3).map(|a| w[0].0[a].abs_diff(w[1].0[a])).sum();
            assert_eq!(diff, 1);
        }
        let mut locators: Vec<[usize; 3]> = visits.iter().map(|v| v.0).collect();
        locators.sort();
        locators.dedup();
        assert_eq!(locators.len(), visits.len());
    }

    #[test]
    fn test_traverse_axis_aligned() {
        let (_, index) = cube_index(2);
        let ray = Ray::new(Point::new(0.1, 0.6, 0.6), Vector::new(1., 0., 0.)).unwrap();
        let mut xs = Vec::new();
        let _: Option<()> = index.grid().traverse(&ray, |_, v| {
            xs.push(v.locator[0]);
            assert_eq!(&v.locator[1..], &[2, 2]);
            None
        });
        assert_eq!(xs, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_traverse_outside_origin_visits_nothing() {
        let (_, index) = cube_index(2);
        let ray = Ray::new(Point::new(-1., 0.5, 0.5), Vector::new(1., 0., 0.)).unwrap();
        let mut count = 0;
        let _: Option<()> = index.grid().traverse(&ray, |_, _| {
            count += 1;
            None
        });
        assert_eq!(count, 0);
    }

    #[test]
    fn test_intersect_nearest_wall() {
        let (scene, index) = cube_index(3);
        let ray = Ray::new(Point::new(0.3, 0.4, 0.6), Vector::new(1., 0., 0.)).unwrap();
        let hit = index.intersect(&scene, &ray, None).unwrap();
        assert!((hit.distance - 0.7).abs() < 1e-9);
        let verts = scene.triangle_verts(hit.triangle);
        assert!(verts.iter().all(|v| (v.x - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_point_visible_inside_box() {
        let (scene, index) = cube_index(2);
        assert!(index.point_visible(&scene, Point::new(0.2, 0.2, 0.2), Point::new(0.8, 0.7, 0.6), None));
    }
}
