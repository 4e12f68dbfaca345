//! Time-aware point quadtree.
//!
//! The tree partitions readings by location and records, per node, the
//! smallest time interval spanning everything below it. Nodes live in a flat
//! arena and refer to their children by [`NodeId`]; there are no parent
//! pointers. Once built the tree is only read, so a shared reference can be
//! queried from any number of threads.

use super::dictionary::{CodeDictionary, PointCodes};
use crate::error::{DriftError, Result};
use crate::spatial::{DistanceMetric, distance_km, search_region_km};
use driftmap_types::point::Reading;
use driftmap_types::quadcode::{Quadcode, Quadrant};
use driftmap_types::region::{Frame, Region};
use geo::Point;
use serde::{Deserialize, Serialize};
use std::time::{Instant, SystemTime};

/// Index of a node in the tree's arena.
pub type NodeId = usize;

const ROOT: NodeId = 0;

/// A single node of a [`TimeQuadTree`].
///
/// A node either holds readings (leaf) or has exactly four children
/// (divided), never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuadNode {
    boundary: Region,
    points: Vec<Reading>,
    children: Option<[NodeId; 4]>,
    depth: u8,
    code: Quadcode,
    time_min: Option<SystemTime>,
    time_max: Option<SystemTime>,
}

impl QuadNode {
    fn new(boundary: Region, depth: u8, code: Quadcode) -> Self {
        Self {
            boundary,
            points: Vec::new(),
            children: None,
            depth,
            code,
            time_min: None,
            time_max: None,
        }
    }

    pub fn boundary(&self) -> &Region {
        &self.boundary
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn code(&self) -> Quadcode {
        self.code
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Readings stored directly in this node (empty unless it is a leaf).
    pub fn points(&self) -> &[Reading] {
        &self.points
    }

    /// Earliest and latest reading time in this subtree.
    pub fn time_bounds(&self) -> Option<(SystemTime, SystemTime)> {
        self.time_min.zip(self.time_max)
    }

    fn absorb_time(&mut self, time: SystemTime) {
        if self.time_min.is_none_or(|min| time < min) {
            self.time_min = Some(time);
        }
        if self.time_max.is_none_or(|max| time > max) {
            self.time_max = Some(time);
        }
    }

    /// Whether `[t_min, t_max]` can match anything in this subtree.
    ///
    /// Fails for inverted windows, empty subtrees and disjoint intervals.
    fn overlaps_time(&self, t_min: SystemTime, t_max: SystemTime) -> bool {
        if t_min > t_max {
            return false;
        }
        match self.time_bounds() {
            Some((min, max)) => t_min <= max && t_max >= min,
            None => false,
        }
    }
}

/// Borrowed view of one subtree.
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a TimeQuadTree,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node(&self) -> &'a QuadNode {
        &self.tree.nodes[self.id]
    }

    pub fn boundary(&self) -> &'a Region {
        &self.node().boundary
    }

    pub fn code(&self) -> Quadcode {
        self.node().code
    }

    pub fn depth(&self) -> u8 {
        self.node().depth
    }

    pub fn is_leaf(&self) -> bool {
        self.node().is_leaf()
    }

    pub fn points(&self) -> &'a [Reading] {
        &self.node().points
    }

    pub fn time_bounds(&self) -> Option<(SystemTime, SystemTime)> {
        self.node().time_bounds()
    }

    pub fn child(&self, quadrant: Quadrant) -> Option<NodeRef<'a>> {
        self.node().children.map(|children| NodeRef {
            tree: self.tree,
            id: children[quadrant.index()],
        })
    }

    pub fn children(&self) -> Option<[NodeRef<'a>; 4]> {
        let tree = self.tree;
        self.node()
            .children
            .map(|children| children.map(|id| NodeRef { tree, id }))
    }

    /// Total readings in this subtree.
    pub fn count(&self) -> u64 {
        self.tree
            .subtree_ids(self.id)
            .map(|id| self.tree.nodes[id].points.len() as u64)
            .sum()
    }
}

/// Spatial-temporal quadtree over drifter readings.
///
/// Nodes split only when an insertion would exceed `max_points` and the node
/// is shallower than `max_depth`. Nodes at `max_depth` keep absorbing
/// readings past capacity instead of splitting further, which bounds the
/// number of times a narrow region gets halved.
///
/// # Examples
///
/// ```rust
/// use driftmap::index::TimeQuadTree;
/// use driftmap::{Reading, Region};
/// use std::time::{Duration, UNIX_EPOCH};
///
/// let area = Region::geographic(7.2, 9.5, 53.5, 54.6);
/// let t = UNIX_EPOCH + Duration::from_secs(3600);
/// let readings = vec![
///     Reading::new(1, t, 8.00, 54.00),
///     Reading::new(2, t, 8.01, 54.00),
///     Reading::new(3, t, 9.20, 53.70),
/// ];
///
/// let tree = TimeQuadTree::build(readings, area, 2, 20).unwrap();
/// assert_eq!(tree.count(), 3);
///
/// let near = tree.query_region(&Region::geographic(7.9, 8.1, 53.9, 54.1));
/// assert_eq!(near.len(), 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeQuadTree {
    nodes: Vec<QuadNode>,
    max_points: usize,
    max_depth: u8,
}

impl TimeQuadTree {
    /// Create an empty tree covering `boundary`.
    ///
    /// # Panics
    ///
    /// Panics if `max_points` is zero or `max_depth` exceeds [`Quadcode::MAX_DEPTH`].
    pub fn new(boundary: Region, max_points: usize, max_depth: u8) -> Self {
        assert!(max_points > 0, "max_points must be greater than zero");
        assert!(
            max_depth <= Quadcode::MAX_DEPTH,
            "max_depth must not exceed {}",
            Quadcode::MAX_DEPTH
        );

        Self {
            nodes: vec![QuadNode::new(boundary, 0, Quadcode::ROOT)],
            max_points,
            max_depth,
        }
    }

    /// Build a tree from a batch of readings.
    ///
    /// # Errors
    ///
    /// Returns [`DriftError::InvalidConfig`] if `max_points` is zero or
    /// `max_depth` exceeds [`Quadcode::MAX_DEPTH`], and
    /// [`DriftError::OutOfBounds`] for the first reading outside
    /// `boundary`. Input is expected to be pre-filtered to the area of
    /// interest, so this signals a data/config mismatch and the partially
    /// built tree is discarded.
    pub fn build<I>(readings: I, boundary: Region, max_points: usize, max_depth: u8) -> Result<Self>
    where
        I: IntoIterator<Item = Reading>,
    {
        if max_points == 0 {
            return Err(DriftError::InvalidConfig(
                "max_points must be greater than zero".to_string(),
            ));
        }
        if max_depth > Quadcode::MAX_DEPTH {
            return Err(DriftError::InvalidConfig(format!(
                "max_depth must not exceed {}",
                Quadcode::MAX_DEPTH
            )));
        }

        let started = Instant::now();
        let mut tree = Self::new(boundary, max_points, max_depth);

        for reading in readings {
            if !tree.insert(reading) {
                return Err(DriftError::OutOfBounds {
                    label: reading.label,
                    longitude: reading.longitude,
                    latitude: reading.latitude,
                });
            }
        }

        log::info!(
            "Built quadtree with {} readings in {} nodes ({} leaves, depth {}) in {:?}",
            tree.count(),
            tree.node_count(),
            tree.leaf_count(),
            tree.depth(),
            started.elapsed()
        );
        Ok(tree)
    }

    /// Insert one reading. Returns false if it lies outside the root boundary.
    pub fn insert(&mut self, reading: Reading) -> bool {
        self.insert_at(ROOT, reading)
    }

    fn insert_at(&mut self, id: NodeId, reading: Reading) -> bool {
        if !self.nodes[id]
            .boundary
            .contains(reading.longitude, reading.latitude)
        {
            return false;
        }

        if self.nodes[id].is_leaf() {
            let node = &self.nodes[id];
            let has_room = node.points.len() < self.max_points || node.depth >= self.max_depth;
            if has_room || !self.divide(id) {
                let node = &mut self.nodes[id];
                node.points.push(reading);
                node.absorb_time(reading.time);
                return true;
            }
        }

        let Some(children) = self.nodes[id].children else {
            return false;
        };
        for child in children {
            if self.insert_at(child, reading) {
                self.nodes[id].absorb_time(reading.time);
                return true;
            }
        }
        false
    }

    /// Split a leaf into four children and push its readings down.
    fn divide(&mut self, id: NodeId) -> bool {
        let (regions, depth, code) = {
            let node = &self.nodes[id];
            (node.boundary.split(), node.depth, node.code)
        };

        let mut codes = [Quadcode::ROOT; 4];
        for quadrant in Quadrant::ALL {
            match code.child(quadrant) {
                Some(child) => codes[quadrant.index()] = child,
                None => return false,
            }
        }

        let first = self.nodes.len();
        for quadrant in Quadrant::ALL {
            let i = quadrant.index();
            self.nodes.push(QuadNode::new(regions[i], depth + 1, codes[i]));
        }
        let children = [first, first + 1, first + 2, first + 3];

        let points = std::mem::take(&mut self.nodes[id].points);
        self.nodes[id].children = Some(children);
        for reading in points {
            let placed = children
                .iter()
                .any(|&child| self.insert_at(child, reading));
            debug_assert!(placed, "quadrants must partition their parent");
        }
        true
    }

    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            id: ROOT,
        }
    }

    pub fn boundary(&self) -> &Region {
        &self.nodes[ROOT].boundary
    }

    pub fn frame(&self) -> Frame {
        self.nodes[ROOT].boundary.frame
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    pub fn node(&self, id: NodeId) -> Option<&QuadNode> {
        self.nodes.get(id)
    }

    /// Total readings in the tree.
    pub fn count(&self) -> u64 {
        self.root().count()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[ROOT].time_min.is_none()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_leaf()).count()
    }

    /// Depth of the deepest node.
    pub fn depth(&self) -> u8 {
        self.nodes.iter().map(|node| node.depth).max().unwrap_or(0)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &QuadNode> {
        self.nodes.iter()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &QuadNode> {
        self.nodes.iter().filter(|node| node.is_leaf())
    }

    /// Every indexed reading, leaf by leaf.
    pub fn points(&self) -> impl Iterator<Item = &Reading> {
        self.leaves().flat_map(|leaf| leaf.points.iter())
    }

    /// Ids of `id` and all its descendants.
    fn subtree_ids(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack = vec![id];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            if let Some(children) = self.nodes[next].children {
                stack.extend(children);
            }
            Some(next)
        })
    }

    /// Depth-first walk that only descends into nodes accepted by `visit`.
    fn walk<F, G>(&self, mut visit: F, mut on_point: G)
    where
        F: FnMut(&QuadNode) -> bool,
        G: FnMut(&Reading),
    {
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if !visit(node) {
                continue;
            }
            node.points.iter().for_each(&mut on_point);
            if let Some(children) = node.children {
                stack.extend(children);
            }
        }
    }

    /// Readings inside `region`.
    ///
    /// Regions in another frame are converted to the tree's frame first.
    pub fn query_region(&self, region: &Region) -> Vec<Reading> {
        let region = region.to_frame(self.frame());
        let mut found = Vec::new();
        self.walk(
            |node| node.boundary.intersects(&region),
            |reading| {
                if region.contains(reading.longitude, reading.latitude) {
                    found.push(*reading);
                }
            },
        );
        found
    }

    /// Readings within Euclidean `radius` (in frame units) of `center`.
    ///
    /// Candidates must also fall inside the circle's half-open bounding
    /// square, so points on its east and north edges are excluded.
    pub fn query_circle(&self, center: &Point<f64>, radius: f64) -> Vec<Reading> {
        let square = bounding_square(center, radius, self.frame());
        let mut found = Vec::new();
        self.walk(
            |node| node.boundary.intersects(&square),
            |reading| {
                let dx = reading.longitude - center.x();
                let dy = reading.latitude - center.y();
                if square.contains(reading.longitude, reading.latitude)
                    && dx.hypot(dy) <= radius
                {
                    found.push(*reading);
                }
            },
        );
        found
    }

    /// Readings inside `region` whose time lies in `[t_min, t_max]`.
    ///
    /// Subtrees whose time interval misses the window are skipped without
    /// looking at their readings. An inverted window matches nothing.
    pub fn query_time_bounded(
        &self,
        region: &Region,
        t_min: SystemTime,
        t_max: SystemTime,
    ) -> Vec<Reading> {
        let region = region.to_frame(self.frame());
        let mut found = Vec::new();
        self.walk(
            |node| node.overlaps_time(t_min, t_max) && node.boundary.intersects(&region),
            |reading| {
                if region.contains(reading.longitude, reading.latitude)
                    && t_min <= reading.time
                    && reading.time <= t_max
                {
                    found.push(*reading);
                }
            },
        );
        found
    }

    /// Readings within `radius_km` of a longitude/latitude `center` whose time
    /// lies in `[t_min, t_max]`, paired with their distance in km.
    pub fn query_time_bounded_km(
        &self,
        center: &Point<f64>,
        radius_km: f64,
        t_min: SystemTime,
        t_max: SystemTime,
        metric: DistanceMetric,
    ) -> Vec<(Reading, f64)> {
        let region = search_region_km(center, radius_km);
        self.query_time_bounded(&region, t_min, t_max)
            .into_iter()
            .filter_map(|reading| {
                let d = distance_km(center, &reading.position(), metric);
                (d <= radius_km).then_some((reading, d))
            })
            .collect()
    }

    /// Code of the leaf whose boundary contains `position`.
    pub fn code_for(&self, position: &Point<f64>) -> Option<Quadcode> {
        let mut node = self.root();
        if !node.boundary().contains_point(position) {
            return None;
        }
        while let Some(children) = node.children() {
            node = children
                .into_iter()
                .find(|child| child.boundary().contains_point(position))?;
        }
        Some(node.code())
    }

    /// Direct addressing by code.
    pub fn subtree_at(&self, code: &Quadcode) -> Option<NodeRef<'_>> {
        code.quadrants()
            .try_fold(self.root(), |node, quadrant| node.child(quadrant))
    }

    /// Map every node's code (internal nodes included) to its boundary.
    pub fn code_dictionary(&self) -> CodeDictionary {
        CodeDictionary::from_tree(self)
    }

    /// Map every indexed reading to the code of the leaf holding it.
    pub fn assign_codes(&self) -> PointCodes {
        self.leaves()
            .flat_map(|leaf| leaf.points.iter().map(|reading| (reading.key(), leaf.code)))
            .collect()
    }
}

fn bounding_square(center: &Point<f64>, radius: f64, frame: Frame) -> Region {
    Region::new(
        center.x() - radius,
        center.x() + radius,
        center.y() - radius,
        center.y() + radius,
        frame,
    )
}
