//! Adaptive quadtree discretization of a [`crate::PotentialField`].
//!
//! The tree subdivides the field's square extent into four children whenever
//! a node's "boundary zone" (how close the nearest contributing primitive
//! gets, expressed as a discretized ring index) says the resolution is worth
//! refining. Nodes are stored in a flat arena and referenced by stable
//! [`NodeId`] handles rather than owned boxed children, so a hot-loader can
//! splice subtrees in and out without walking parent links.

use std::collections::HashSet;

use nalgebra::Vector2;

use crate::field::PotentialField;
use smallvec::SmallVec;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A discretized proximity ring: `0` is "inside or touching" a primitive,
/// increasing indices are farther rings, and `n_zones` (one past the last
/// configured ring) means "out of range, do not subdivide further".
pub type Zone = usize;

/// Build parameters for a [`Quadtree`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Subdivision stops once a child's size would fall below this.
    pub min_sector_size: f64,
    /// Subdivision never produces a node larger than this.
    pub max_sector_size: f64,
    /// Zone-boundary radii as potential (`eval`) values, e.g. `[0.2, 0.4, 0.6]`.
    /// Internally sorted descending and converted to squared-distance space.
    pub edge_bounds: Vec<f64>,
    /// When set, a node also stops subdividing once no boundary primitive's
    /// potential at the node's corner drops below the zone's lower range,
    /// trading a few extra (slightly oversized) leaves for fewer splits.
    pub conservative: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_sector_size: 5.0,
            max_sector_size: f64::INFINITY,
            edge_bounds: vec![0.2, 0.4, 0.6],
            conservative: false,
        }
    }
}

/// A stable handle into a [`Quadtree`]'s node arena. Valid only for the tree
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child {
    Tl = 0,
    Tr = 1,
    Bl = 2,
    Br = 3,
}

pub const CHILDREN: [Child; 4] = [Child::Tl, Child::Tr, Child::Bl, Child::Br];

/// One quadtree cell: its extent, the zone it was built at, the primitive
/// indices/zones it still tracks, and its (if any) four children.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QuadNode {
    pub center_point: Vector2<f64>,
    pub size: f64,
    pub leaf: bool,
    pub boundary_zone: Zone,
    pub boundary_max_range: f64,
    pub rgj_idx: SmallVec<[usize; 4]>,
    pub rgj_zones: SmallVec<[Zone; 4]>,
    children: [Option<NodeId>; 4],
    /// Eight cached neighbor pointers (tl, t, tr, r, br, b, bl, l), populated
    /// and consumed by the router's [`crate::RoutingGraph`] implementation --
    /// the quadtree itself never reads or writes these beyond allocation.
    neighbors: [Option<NodeId>; 8],
}

impl QuadNode {
    fn new(center_point: Vector2<f64>, size: f64) -> Self {
        QuadNode {
            center_point,
            size,
            leaf: false,
            boundary_zone: 0,
            boundary_max_range: 1.0,
            rgj_idx: SmallVec::new(),
            rgj_zones: SmallVec::new(),
            children: [None; 4],
            neighbors: [None; 8],
        }
    }

    pub fn child(&self, c: Child) -> Option<NodeId> {
        self.children[c as usize]
    }

    pub fn children_ids(&self) -> [Option<NodeId>; 4] {
        self.children
    }

    pub fn neighbor(&self, idx: usize) -> Option<NodeId> {
        self.neighbors[idx]
    }

    pub fn set_neighbor(&mut self, idx: usize, value: Option<NodeId>) {
        self.neighbors[idx] = value;
    }
}

fn digitize_right(bins: &[f64], value: f64) -> usize {
    bins.iter().filter(|&&b| b < value).count()
}

/// Arena-backed adaptive quadtree built from a [`PotentialField`]'s zone
/// classification.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Quadtree {
    nodes: Vec<Option<QuadNode>>,
    free_list: Vec<u32>,
    root: Option<NodeId>,
    leaves: HashSet<NodeId>,
    pub center_point: Vector2<f64>,
    pub size: f64,
    pub min_sector_size: f64,
    pub max_sector_size: f64,
    edge_bounds: Vec<f64>,
    n_zones: usize,
    zones_rad_ln: Vec<f64>,
    zone_to_max_range: Vec<f64>,
    zone_to_min_range: Vec<f64>,
    pub conservative: bool,
}

impl Quadtree {
    /// Creates an (unbuilt) quadtree over `field`'s extent. Call [`Self::build`]
    /// to populate it, or use [`Self::built`] to do both in one step.
    pub fn new(field: &PotentialField, config: Config) -> Self {
        let mut edge_bounds = config.edge_bounds;
        edge_bounds.sort_by(|a, b| b.partial_cmp(a).unwrap());
        let n_zones = edge_bounds.len() + 1;
        let zones_rad_ln: Vec<f64> = edge_bounds.iter().map(|e| -e.ln()).collect();

        let mut zone_to_max_range = vec![1.0, 1.0];
        zone_to_max_range.extend(edge_bounds.iter().copied());
        let mut zone_to_min_range = Vec::with_capacity(n_zones + 1);
        zone_to_min_range.push(edge_bounds.first().copied().unwrap_or(0.0));
        zone_to_min_range.extend(edge_bounds.iter().copied());
        zone_to_min_range.push(0.0);

        let size = field.size().x.max(field.size().y);

        Quadtree {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: None,
            leaves: HashSet::new(),
            center_point: field.center_point(),
            size,
            min_sector_size: config.min_sector_size,
            max_sector_size: config.max_sector_size,
            edge_bounds,
            n_zones,
            zones_rad_ln,
            zone_to_max_range,
            zone_to_min_range,
            conservative: config.conservative,
        }
    }

    /// As [`Self::new`], also performing the initial [`Self::build`].
    pub fn built(field: &PotentialField, config: Config) -> Self {
        let mut tree = Self::new(field, config);
        tree.build(field);
        tree
    }

    pub fn n_zones(&self) -> usize {
        self.n_zones
    }

    pub fn edge_bounds(&self) -> &[f64] {
        &self.edge_bounds
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn leaves(&self) -> &HashSet<NodeId> {
        &self.leaves
    }

    pub fn node(&self, id: NodeId) -> &QuadNode {
        self.nodes[id.0 as usize].as_ref().expect("stale NodeId")
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut QuadNode {
        self.nodes[id.0 as usize].as_mut().expect("stale NodeId")
    }

    pub fn get_quad_zones(&self) -> Vec<Zone> {
        self.leaves.iter().map(|&id| self.node(id).boundary_zone).collect()
    }

    pub fn get_quad_maximum_range(&self) -> Vec<f64> {
        self.leaves.iter().map(|&id| self.node(id).boundary_max_range).collect()
    }

    /// Finds the leaf containing each query point, `None` when the tree has
    /// no root yet.
    pub fn find_quads(&self, points: &[Vector2<f64>]) -> Vec<Option<NodeId>> {
        points.iter().map(|&p| self.find_quad_one(p)).collect()
    }

    fn find_quad_one(&self, p: Vector2<f64>) -> Option<NodeId> {
        let mut current = self.root;
        loop {
            let id = current?;
            let node = self.node(id);
            if node.leaf {
                return Some(id);
            }
            let direction = p - node.center_point;
            let child = if direction.y >= 0.0 {
                if direction.x >= 0.0 { Child::Tr } else { Child::Tl }
            } else if direction.x >= 0.0 {
                Child::Br
            } else {
                Child::Bl
            };
            current = node.child(child);
        }
    }

    /// Collects the leaves reachable from `root` (or the tree's own root
    /// when `None`) by walking down, rather than reading the cached
    /// [`Self::leaves`] set -- used to recompute a subtree's current leaves
    /// after a splice.
    pub fn search_leaves(&self, root: Option<NodeId>) -> HashSet<NodeId> {
        let mut out = HashSet::new();
        if let Some(id) = root.or(self.root) {
            self.search_leaves_into(id, &mut out);
        }
        out
    }

    fn search_leaves_into(&self, id: NodeId, out: &mut HashSet<NodeId>) {
        let node = self.node(id);
        if node.leaf {
            out.insert(id);
            return;
        }
        for child in node.children_ids().into_iter().flatten() {
            self.search_leaves_into(child, out);
        }
    }

    pub(crate) fn mark_leaf(&mut self, id: NodeId) {
        self.node_mut(id).leaf = true;
        self.leaves.insert(id);
    }

    pub(crate) fn leaves_insert(&mut self, ids: impl IntoIterator<Item = NodeId>) {
        self.leaves.extend(ids);
    }

    pub(crate) fn leaves_remove(&mut self, ids: &HashSet<NodeId>) {
        for id in ids {
            self.leaves.remove(id);
        }
    }

    pub(crate) fn set_root(&mut self, id: Option<NodeId>) {
        self.root = id;
    }

    pub(crate) fn set_child(&mut self, parent: NodeId, child: Child, value: Option<NodeId>) {
        self.node_mut(parent).children[child as usize] = value;
    }

    /// Inserts a fully-formed node (its `children` are taken as given) and
    /// returns its handle, reusing a freed slot when available.
    pub(crate) fn alloc_node(&mut self, node: QuadNode) -> NodeId {
        if let Some(slot) = self.free_list.pop() {
            self.nodes[slot as usize] = Some(node);
            NodeId(slot)
        } else {
            self.nodes.push(Some(node));
            NodeId((self.nodes.len() - 1) as u32)
        }
    }

    /// Recursively frees `id` and its whole subtree, returning the slots to
    /// the free list and removing any freed leaves from [`Self::leaves`].
    pub(crate) fn free_subtree(&mut self, id: NodeId) {
        let children = self.node(id).children_ids();
        for child in children.into_iter().flatten() {
            self.free_subtree(child);
        }
        self.leaves.remove(&id);
        self.nodes[id.0 as usize] = None;
        self.free_list.push(id.0);
    }

    /// Shifts every node's `rgj_idx` entries by `shift`, used when splicing
    /// a temporary single-field tree's indices into the host field's index
    /// space during hot-loading.
    pub(crate) fn shift_indices(&mut self, shift: usize) {
        if let Some(root) = self.root {
            self.shift_indices_from(root, shift);
        }
    }

    fn shift_indices_from(&mut self, id: NodeId, shift: usize) {
        let children = {
            let node = self.node_mut(id);
            for idx in node.rgj_idx.iter_mut() {
                *idx += shift;
            }
            node.children_ids()
        };
        for child in children.into_iter().flatten() {
            self.shift_indices_from(child, shift);
        }
    }

    /// Deep-copies the subtree rooted at `src_id` of a different (e.g.
    /// temporary) `Quadtree` into `self`'s arena, remapping child handles and
    /// registering any copied leaf into [`Self::leaves`]. Used by the
    /// hot-loader to splice a freshly-built branch into the host tree.
    pub(crate) fn clone_subtree_from(&mut self, src: &Quadtree, src_id: NodeId) -> NodeId {
        let src_node = src.node(src_id);
        let mut node = QuadNode::new(src_node.center_point, src_node.size);
        node.leaf = src_node.leaf;
        node.boundary_zone = src_node.boundary_zone;
        node.boundary_max_range = src_node.boundary_max_range;
        node.rgj_idx = src_node.rgj_idx.clone();
        node.rgj_zones = src_node.rgj_zones.clone();

        let mut children = [None; 4];
        for child in CHILDREN {
            if let Some(src_child) = src_node.child(child) {
                children[child as usize] = Some(self.clone_subtree_from(src, src_child));
            }
        }
        node.children = children;

        let is_leaf = node.leaf;
        let id = self.alloc_node(node);
        if is_leaf {
            self.leaves.insert(id);
        }
        id
    }

    /// Rebuilds from scratch: [`Self::center_point`] and [`Self::size`] are
    /// used as the root extent, all of `field`'s primitive indices as the
    /// initial filter.
    pub fn build(&mut self, field: &PotentialField) {
        self.leaves.clear();
        self.nodes.clear();
        self.free_list.clear();
        let filter_idx: Vec<usize> = (0..field.len()).collect();
        let center = self.center_point;
        let size = self.size;
        let root = self.build_node(field, center, size, filter_idx);
        self.root = Some(root);
    }

    /// Classifies each filtered primitive's zone at `center`/`size`: zone `0`
    /// when within `size*size/2` squared distance of `center`, else the ring
    /// index of its squared distance from the node's corner (along its own
    /// repulsion direction), else `n_zones` when no configured zone covers it.
    fn approximated_pf_zones(
        &self,
        field: &PotentialField,
        center: Vector2<f64>,
        size: f64,
        filter_idx: &[usize],
    ) -> (Vec<Zone>, Vec<Vector2<f64>>) {
        let n = filter_idx.len();
        let (rep_vectors, ref_idxs) = field.repulsion_vectors_with_ref(&[center], Some(filter_idx));
        let mut zones = vec![self.n_zones; n];

        let mut not_zone0 = Vec::new();
        for i in 0..n {
            let v = rep_vectors[i];
            if v.dot(&v) <= (size * size) / 2.0 {
                zones[i] = 0;
            } else {
                not_zone0.push(i);
            }
        }

        if !not_zone0.is_empty() {
            let rgjs_idx: Vec<usize> = not_zone0.iter().map(|&i| ref_idxs[i]).collect();
            let points: Vec<Vector2<f64>> = not_zone0
                .iter()
                .map(|&i| {
                    let v = rep_vectors[i];
                    let uni = v / v.norm();
                    center - uni * (size / std::f64::consts::SQRT_2)
                })
                .collect();
            let dist_sqr = field
                .squared_dist_per(&points, &rgjs_idx)
                .expect("points and rgjs_idx built to the same length");
            for (k, &i) in not_zone0.iter().enumerate() {
                zones[i] = digitize_right(&self.zones_rad_ln, dist_sqr[k]) + 1;
            }
        }

        (zones, rep_vectors)
    }

    pub(crate) fn build_node(
        &mut self,
        field: &PotentialField,
        center: Vector2<f64>,
        size: f64,
        filter_idx: Vec<usize>,
    ) -> NodeId {
        let mut node = QuadNode::new(center, size);
        let mut zones_all = Vec::new();
        let mut rep_vectors_all = Vec::new();

        if !filter_idx.is_empty() {
            let (zones, rep_vectors) = self.approximated_pf_zones(field, center, size, &filter_idx);
            node.boundary_zone = *zones.iter().min().unwrap();

            for (i, &z) in zones.iter().enumerate() {
                if z < self.n_zones {
                    node.rgj_idx.push(filter_idx[i]);
                    node.rgj_zones.push(z);
                }
            }
            zones_all = zones;
            rep_vectors_all = rep_vectors;
        } else {
            node.boundary_zone = self.n_zones;
        }

        node.boundary_max_range = self.zone_to_max_range[node.boundary_zone];

        let size2 = size / 2.0;
        if size <= self.max_sector_size {
            if size2 < self.min_sector_size || node.boundary_zone == self.n_zones {
                let id = self.alloc_node(node);
                self.mark_leaf(id);
                return id;
            }
            if self.conservative && node.boundary_zone > 0 {
                let lower_range = self.zone_to_min_range[node.boundary_zone];
                let mut corner_points = Vec::new();
                let mut corner_refs = Vec::new();
                for (i, &z) in zones_all.iter().enumerate() {
                    if z == node.boundary_zone {
                        let v = rep_vectors_all[i];
                        let uni = v / v.norm();
                        corner_points.push(center + uni * (size / std::f64::consts::SQRT_2));
                        corner_refs.push(filter_idx[i]);
                    }
                }
                if !corner_points.is_empty() {
                    let bounds_evals = field
                        .eval_per(&corner_points, &corner_refs)
                        .expect("corner_points and corner_refs built to the same length");
                    if bounds_evals.iter().any(|&e| e >= lower_range) {
                        let id = self.alloc_node(node);
                        self.mark_leaf(id);
                        return id;
                    }
                }
            }
        }

        let size4 = size2 / 2.0;
        let child_filter: Vec<usize> = node.rgj_idx.iter().copied().collect();
        let offsets = [
            (Child::Tl, Vector2::new(-size4, size4)),
            (Child::Tr, Vector2::new(size4, size4)),
            (Child::Bl, Vector2::new(-size4, -size4)),
            (Child::Br, Vector2::new(size4, -size4)),
        ];
        let mut children = [None; 4];
        for (child, offset) in offsets {
            let id = self.build_node(field, center + offset, size2, child_filter.clone());
            children[child as usize] = Some(id);
        }
        node.children = children;
        self.alloc_node(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Primitive;

    fn v(x: f64, y: f64) -> Vector2<f64> {
        Vector2::new(x, y)
    }

    fn two_points_field() -> PotentialField {
        let p1 = Primitive::point(v(50.0, 50.0), Some(5.0 * nalgebra::Matrix2::identity())).unwrap();
        let p2 = Primitive::point(v(60.0, 60.0), Some(5.0 * nalgebra::Matrix2::identity())).unwrap();
        PotentialField::with_primitives(vec![p1, p2], Some(v(55.0, 55.0)), Some(v(50.0, 50.0)))
    }

    fn scenario_config() -> Config {
        Config {
            min_sector_size: 5.0,
            max_sector_size: f64::INFINITY,
            edge_bounds: vec![0.6, 0.4, 0.2],
            conservative: false,
        }
    }

    #[test]
    fn build_produces_a_root_and_leaves() {
        let field = two_points_field();
        let tree = Quadtree::built(&field, scenario_config());
        assert!(tree.root().is_some());
        assert!(!tree.leaves().is_empty());
    }

    #[test]
    fn find_quads_returns_leaf_under_point() {
        let field = two_points_field();
        let tree = Quadtree::built(&field, scenario_config());
        let found = tree.find_quads(&[v(50.0, 50.0)]);
        let id = found[0].expect("point inside field extent must resolve to a leaf");
        assert!(tree.node(id).leaf);
    }

    #[test]
    fn search_leaves_matches_cached_leaves_s1() {
        let field = two_points_field();
        let tree = Quadtree::built(&field, scenario_config());
        let walked = tree.search_leaves(None);
        assert_eq!(walked, *tree.leaves());
    }

    #[test]
    fn leaf_near_point_gets_zone_zero() {
        let field = two_points_field();
        let tree = Quadtree::built(&field, scenario_config());
        let id = tree.find_quads(&[v(50.0, 50.0)])[0].unwrap();
        assert_eq!(tree.node(id).boundary_zone, 0);
    }

    #[test]
    fn far_corner_is_out_of_range_leaf() {
        let field = two_points_field();
        let tree = Quadtree::built(&field, scenario_config());
        let id = tree.find_quads(&[v(79.0, 79.0)])[0].unwrap();
        assert_eq!(tree.node(id).boundary_zone, tree.n_zones());
    }

    #[test]
    fn empty_field_builds_a_single_out_of_range_leaf() {
        let field = PotentialField::with_primitives(vec![], Some(v(0.0, 0.0)), Some(v(50.0, 50.0)));
        let tree = Quadtree::built(&field, scenario_config());
        let root = tree.root().unwrap();
        assert!(tree.node(root).leaf);
        assert_eq!(tree.node(root).boundary_zone, tree.n_zones());
    }
}
