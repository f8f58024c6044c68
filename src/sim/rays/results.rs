use std::collections::BTreeMap;

use crate::Point;

use super::Impulse;
use super::image_source::PathKey;

/// Output of one raytrace between a source and a receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct RaytracerResults {
    pub diffuse: Vec<Impulse>,
    /// Specular impulses by surface path. The empty path is the direct sound.
    pub image_source: BTreeMap<PathKey, Impulse>,
    pub source: Point,
    pub receiver: Point,
    pub rays: usize,
    pub reflections: usize,
}

impl RaytracerResults {
    pub fn new(source: Point, receiver: Point, rays: usize, reflections: usize) -> Self {
        Self {
            diffuse: Vec::new(),
            image_source: BTreeMap::new(),
            source,
            receiver,
            rays,
            reflections,
        }
    }

    pub fn get_diffuse(&self) -> &[Impulse] {
        &self.diffuse
    }

    pub fn get_image_source(&self, remove_direct: bool) -> Vec<Impulse> {
        self.image_source
            .iter()
            .filter(|(path, _)| !(remove_direct && path.is_empty()))
            .map(|(_, impulse)| *impulse)
            .collect()
    }

    /// Specular then diffuse impulses.
    pub fn get_all(&self, remove_direct: bool) -> Vec<Impulse> {
        let mut all = self.get_image_source(remove_direct);
        all.extend_from_slice(&self.diffuse);
        all
    }

    pub fn direct(&self) -> Option<&Impulse> {
        self.image_source.get(&PathKey::new())
    }

    /// Stores the impulse of `path` unless one is already there.
    pub fn insert_image_source(&mut self, path: PathKey, impulse: Impulse) -> bool {
        match self.image_source.entry(path) {
            std::collections::btree_map::Entry::Vacant(e) => {
                e.insert(impulse);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.diffuse.is_empty() && self.image_source.is_empty()
    }
}
