//! Spatial partitioning of scene geometry.
//!
//! A recursive 2^n tree (quadtree in 2D, octree in 3D) is stored as an arena
//! of nodes addressed by index. Each level keeps only the items overlapping
//! its region; nodes at the requested depth are leaves.
//!
//! The 3D scene index also keeps a dense [`VoxelGrid`] of its leaves, which is
//! what ray traversal and point queries walk.

pub mod inside;
pub mod traversal;

use anyhow::{Result, anyhow};
use log::debug;

use crate::Point;
use crate::geom::bboxes::{Aabb, Rect};
use crate::sim::scene::SceneData;

pub use traversal::{Intersection, VoxelGrid, VoxelVisit};

/// Flattened node tag for leaves.
pub const TAG_LEAF: u32 = 0;
/// Flattened node tag for internal nodes.
pub const TAG_INTERNAL: u32 = 1;

/// A region that can be bisected along each of its axes.
pub trait Region: Copy {
    /// Number of axes (2 or 3).
    const DIMENSIONS: usize;
    /// Number of children of an internal node, `2^DIMENSIONS`.
    const CHILDREN: usize = 1 << Self::DIMENSIONS;

    /// Child `index`; bit `k` of the index selects the upper half along axis `k`.
    fn child(&self, index: usize) -> Self;

    /// Min corner coordinates followed by max corner coordinates.
    fn bounds(&self) -> Vec<f64>;
}

impl Region for Aabb {
    const DIMENSIONS: usize = 3;

    fn child(&self, index: usize) -> Self {
        self.octant(index)
    }

    fn bounds(&self) -> Vec<f64> {
        vec![
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z,
        ]
    }
}

impl Region for Rect {
    const DIMENSIONS: usize = 2;

    fn child(&self, index: usize) -> Self {
        self.quadrant(index)
    }

    fn bounds(&self) -> Vec<f64> {
        vec![self.min.0, self.min.1, self.max.0, self.max.1]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Indices of the items overlapping the leaf region.
    Leaf(Vec<u32>),
    /// Arena indices of the children, in [`Region::child`] order.
    Internal(Vec<usize>),
}

#[derive(Debug, Clone)]
pub struct SpatialNode<R> {
    pub region: R,
    pub kind: NodeKind,
}

/// Arena-backed 2^n tree. The root is node 0.
#[derive(Debug, Clone)]
pub struct SpatialTree<R: Region> {
    nodes: Vec<SpatialNode<R>>,
    depth: usize,
}

pub type Quadtree = SpatialTree<Rect>;
pub type Octree = SpatialTree<Aabb>;

impl<R: Region> SpatialTree<R> {
    /// Builds the tree by recursive bisection of `region`.
    ///
    /// `item_checker(item, region)` decides whether an item overlaps a region.
    /// Only the items kept by the parent are tested against its children.
    pub fn build<F>(depth: usize, item_checker: F, candidates: &[u32], region: R) -> Self
    where
        F: Fn(u32, &R) -> bool,
    {
        let mut tree = Self {
            nodes: Vec::new(),
            depth,
        };
        tree.build_node(depth, &item_checker, candidates, region);
        tree
    }

    fn build_node<F>(&mut self, depth: usize, item_checker: &F, candidates: &[u32], region: R) -> usize
    where
        F: Fn(u32, &R) -> bool,
    {
        let items: Vec<u32> = candidates
            .iter()
            .copied()
            .filter(|&i| item_checker(i, &region))
            .collect();

        let index = self.nodes.len();
        self.nodes.push(SpatialNode {
            region,
            kind: NodeKind::Leaf(Vec::new()),
        });

        self.nodes[index].kind = if depth == 0 {
            NodeKind::Leaf(items)
        } else {
            let children = (0..R::CHILDREN)
                .map(|c| self.build_node(depth - 1, item_checker, &items, region.child(c)))
                .collect();
            NodeKind::Internal(children)
        };
        index
    }

    pub fn nodes(&self) -> &[SpatialNode<R>] {
        &self.nodes
    }

    pub fn root(&self) -> &SpatialNode<R> {
        &self.nodes[0]
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of leaves along each axis.
    pub fn get_side(&self) -> usize {
        1 << self.depth
    }

    /// Serializes the tree into a flat buffer of 32-bit words.
    ///
    /// Nodes are written in arena order. Each record holds the region bounds
    /// as `f32` bit patterns, a tag ([`TAG_LEAF`] or [`TAG_INTERNAL`]), a count,
    /// and then either the item indices or the word offsets of the children.
    pub fn flatten(&self) -> Vec<u32> {
        let header = 2 * R::DIMENSIONS + 2;
        let mut offsets = Vec::with_capacity(self.nodes.len());
        let mut total = 0;
        for node in &self.nodes {
            offsets.push(total as u32);
            total += header
                + match &node.kind {
                    NodeKind::Leaf(items) => items.len(),
                    NodeKind::Internal(children) => children.len(),
                };
        }

        let mut out = Vec::with_capacity(total);
        for node in &self.nodes {
            out.extend(node.region.bounds().iter().map(|&b| (b as f32).to_bits()));
            match &node.kind {
                NodeKind::Leaf(items) => {
                    out.push(TAG_LEAF);
                    out.push(items.len() as u32);
                    out.extend_from_slice(items);
                }
                NodeKind::Internal(children) => {
                    out.push(TAG_INTERNAL);
                    out.push(children.len() as u32);
                    out.extend(children.iter().map(|&c| offsets[c]));
                }
            }
        }
        out
    }
}

impl Octree {
    /// Leaf containing point `p`, descending by comparison with region centres.
    pub fn surrounding_leaf(&self, p: Point) -> &SpatialNode<Aabb> {
        let mut node = self.root();
        while let NodeKind::Internal(children) = &node.kind {
            let c = node.region.centre();
            let x = usize::from(p.x > c.x);
            let y = usize::from(p.y > c.y) << 1;
            let z = usize::from(p.z > c.z) << 2;
            node = &self.nodes[children[x | y | z]];
        }
        node
    }
}

/// Octree of scene triangles plus its dense leaf grid.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    tree: Octree,
    grid: VoxelGrid,
}

impl SpatialIndex {
    pub fn new(tree: Octree) -> Self {
        let grid = VoxelGrid::from_tree(&tree);
        Self { tree, grid }
    }

    /// Voxelises a scene: octree of `depth` levels over the scene bounds grown by `padding`.
    pub fn for_scene(scene: &SceneData, depth: usize, padding: f64) -> Result<Self> {
        if scene.triangles().is_empty() {
            return Err(anyhow!("Cannot voxelise a scene without triangles"));
        }
        let aabb = scene.aabb()?.padded(padding);
        let candidates: Vec<u32> = (0..scene.triangles().len() as u32).collect();
        let tree = Octree::build(
            depth,
            |i, region| region.overlaps_triangle(&scene.triangle_verts(i as usize)),
            &candidates,
            aabb,
        );
        debug!(
            "Voxelised {} triangles into a {side}x{side}x{side} grid",
            candidates.len(),
            side = tree.get_side()
        );
        Ok(Self::new(tree))
    }

    pub fn tree(&self) -> &Octree {
        &self.tree
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    pub fn aabb(&self) -> Aabb {
        self.tree.root().region
    }

    pub fn get_side(&self) -> usize {
        self.tree.get_side()
    }

    /// Items stored in the voxel containing `p`, if `p` is inside the grid.
    pub fn items_at(&self, p: Point) -> Option<&[u32]> {
        self.grid.locator_for(p).map(|loc| self.grid.items(loc))
    }
}
