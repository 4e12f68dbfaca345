//! Code-addressed lookup tables derived from a built tree.

use super::quadtree::TimeQuadTree;
use driftmap_types::point::ReadingKey;
use driftmap_types::quadcode::Quadcode;
use driftmap_types::region::Region;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Tree code of the leaf holding each indexed reading.
pub type PointCodes = FxHashMap<ReadingKey, Quadcode>;

/// Boundary of every node in a tree, keyed by its code.
///
/// Internal nodes are included, so any truncation of a leaf code resolves
/// without walking the tree. Codes that were never materialized (a cell
/// below an undivided leaf) fall back to halving the root boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeDictionary {
    root: Option<Region>,
    bounds: FxHashMap<Quadcode, Region>,
}

impl CodeDictionary {
    pub fn from_tree(tree: &TimeQuadTree) -> Self {
        let bounds = tree
            .nodes()
            .map(|node| (node.code(), *node.boundary()))
            .collect();
        Self {
            root: Some(*tree.boundary()),
            bounds,
        }
    }

    /// Boundary of a node that exists in the tree.
    pub fn get(&self, code: &Quadcode) -> Option<&Region> {
        self.bounds.get(code)
    }

    /// Boundary of `code`, derived from the root when the tree never built it.
    pub fn bounds(&self, code: &Quadcode) -> Option<Region> {
        self.bounds
            .get(code)
            .copied()
            .or_else(|| self.root.map(|root| code.region_within(&root)))
    }

    pub fn contains(&self, code: &Quadcode) -> bool {
        self.bounds.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Quadcode, &Region)> {
        self.bounds.iter()
    }
}
