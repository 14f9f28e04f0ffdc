//! Incremental insertion/removal of primitives against an already-built
//! `(field, quadtree, routing graph)` triple, re-subdividing or merging only
//! the affected subtrees instead of rebuilding from scratch.

use std::collections::HashSet;

use smallvec::SmallVec;
use tracing::warn;

use crate::field::PotentialField;
use crate::graph::RoutingGraph;
use crate::primitive::Primitive;
use crate::quadtree::{Child, Config, NodeId, QuadNode, Quadtree, CHILDREN};

/// Binds a field, its quadtree and a routing graph so that inserting or
/// removing primitives keeps all three consistent. Always disables
/// `conservative` mode: the incremental algorithm does not support the
/// stricter stopping predicate.
pub struct HotLoader<'f, 't, G: RoutingGraph> {
    field: &'f mut PotentialField,
    quadtree: &'t mut Quadtree,
    graph: G,
}

impl<'f, 't, G: RoutingGraph> HotLoader<'f, 't, G> {
    pub fn new(field: &'f mut PotentialField, quadtree: &'t mut Quadtree, graph: G) -> Self {
        quadtree.conservative = false;
        HotLoader { field, quadtree, graph }
    }

    fn warn_if_conservative(&self) {
        if self.quadtree.conservative {
            warn!("quadtree made not conservative");
        }
    }

    fn temp_config(&self) -> Config {
        Config {
            min_sector_size: self.quadtree.min_sector_size,
            max_sector_size: self.quadtree.max_sector_size,
            edge_bounds: self.quadtree.edge_bounds().to_vec(),
            conservative: false,
        }
    }

    /// Merges `new_field`'s primitives into the host field and splices its
    /// quadtree into the host quadtree. Returns the indices the new
    /// primitives landed at.
    pub fn add_field(&mut self, new_field: PotentialField) -> Vec<usize> {
        self.warn_if_conservative();
        self.quadtree.conservative = false;

        let mut new_field = new_field;
        new_field.reload_center_point(false, false);
        new_field.set_center_point(self.field.center_point());
        new_field.set_size(self.field.size());

        let mut new_tree = Quadtree::new(&new_field, self.temp_config());
        new_tree.center_point = self.quadtree.center_point;
        new_tree.size = self.quadtree.size;
        new_tree.build(&new_field);

        let n_original = self.field.len();
        for primitive in new_field.primitives().to_vec() {
            self.field.add(primitive);
        }
        new_tree.shift_indices(n_original);

        let mut dirty_new = HashSet::new();
        let mut dirty_old = HashSet::new();
        let root_id = self.quadtree.root().expect("quadtree must be built before hot-loading");
        self.merge_walk(Some(root_id), &new_tree, new_tree.root(), n_original, &mut dirty_new, &mut dirty_old);

        self.finalize_graph(dirty_old, dirty_new);
        (n_original..self.field.len()).collect()
    }

    /// Adds a single primitive, returning its new index.
    pub fn add_rgj(&mut self, primitive: Primitive) -> usize {
        let field = PotentialField::with_primitives(vec![primitive], None, None);
        self.add_field(field)[0]
    }

    /// Removes primitives by index, re-merging any subtree that becomes
    /// fully out of range. Returns the (sorted, deduplicated) indices that
    /// were removed.
    pub fn remove_rgj<I: IntoIterator<Item = usize>>(&mut self, idxs: I) -> Vec<usize> {
        self.warn_if_conservative();
        self.quadtree.conservative = false;

        let mut idxs: Vec<usize> = idxs.into_iter().collect();
        idxs.sort_unstable();
        idxs.dedup();
        let min_idx = idxs[0];

        let rgjs: Vec<Primitive> = idxs
            .iter()
            .map(|&i| self.field.get(i).expect("index out of range").clone())
            .collect();
        let mut search_field = PotentialField::with_primitives(rgjs, None, None);
        search_field.reload_center_point(false, false);
        search_field.set_center_point(self.field.center_point());
        search_field.set_size(self.field.size());

        let mut search_tree = Quadtree::new(&search_field, self.temp_config());
        search_tree.center_point = self.quadtree.center_point;
        search_tree.size = self.quadtree.size;
        search_tree.build(&search_field);

        self.field.del(idxs.clone());

        let mut dirty_new = HashSet::new();
        let mut dirty_old = HashSet::new();
        let root_id = self.quadtree.root();
        self.delete_walk(root_id, &search_tree, search_tree.root(), &idxs, min_idx, &mut dirty_new, &mut dirty_old);

        self.finalize_graph(dirty_old, dirty_new);
        idxs
    }

    fn finalize_graph(&mut self, dirty_old: HashSet<NodeId>, dirty_new: HashSet<NodeId>) {
        for node in dirty_old {
            self.graph.remove(node);
        }
        self.graph.fill_shallow_neighbors(self.quadtree);
        let active: Vec<NodeId> = dirty_new.into_iter().collect();
        self.graph.build_graph(self.quadtree, &active, false);
    }

    /// Synchronized recursive merge of the host subtree at `root_id` against
    /// the freshly-built `new_id` subtree of `new_tree`. Returns whether the
    /// caller (one level up) must splice a replacement in for this child.
    fn merge_walk(
        &mut self,
        root_id: Option<NodeId>,
        new_tree: &Quadtree,
        new_id: Option<NodeId>,
        n_original: usize,
        dirty_new: &mut HashSet<NodeId>,
        dirty_old: &mut HashSet<NodeId>,
    ) -> bool {
        let new_id = match new_id {
            Some(id) => id,
            None => return false,
        };
        if new_tree.node(new_id).boundary_zone == new_tree.n_zones() {
            return false;
        }
        let root_id = root_id.expect("host subtree missing where the new subtree carries real zones");

        let new_bz = new_tree.node(new_id).boundary_zone;
        let new_idx: SmallVec<[usize; 4]> = new_tree.node(new_id).rgj_idx.clone();
        let new_zones: SmallVec<[usize; 4]> = new_tree.node(new_id).rgj_zones.clone();
        {
            let root_node = self.quadtree.node_mut(root_id);
            if new_bz < root_node.boundary_zone {
                root_node.boundary_zone = new_bz;
            }
            root_node.rgj_idx.extend(new_idx);
            root_node.rgj_zones.extend(new_zones);
        }

        if self.quadtree.node(root_id).leaf && !new_tree.node(new_id).leaf {
            return true;
        }

        for child in CHILDREN {
            let root_child = self.quadtree.node(root_id).child(child);
            let new_child = new_tree.node(new_id).child(child);
            if self.merge_walk(root_child, new_tree, new_child, n_original, dirty_new, dirty_old) {
                match root_child {
                    Some(rc) => {
                        let old_leaves = self.quadtree.search_leaves(Some(rc));
                        self.quadtree.leaves_remove(&old_leaves);
                        dirty_old.extend(old_leaves);

                        let has_original = self.quadtree.node(rc).rgj_idx.iter().any(|&i| i < n_original);
                        if has_original {
                            let center = self.quadtree.node(rc).center_point;
                            let size = self.quadtree.node(rc).size;
                            let filter_idx: Vec<usize> = self.quadtree.node(rc).rgj_idx.iter().copied().collect();
                            self.quadtree.free_subtree(rc);
                            let rebuilt = self.quadtree.build_node(self.field, center, size, filter_idx);
                            self.quadtree.set_child(root_id, child, Some(rebuilt));
                            let new_leaves = self.quadtree.search_leaves(Some(rebuilt));
                            dirty_new.extend(new_leaves);
                        } else {
                            self.replace_branch(root_id, child, new_tree, new_id, dirty_new);
                        }
                    }
                    None => self.replace_branch(root_id, child, new_tree, new_id, dirty_new),
                }
            }
        }

        false
    }

    fn replace_branch(
        &mut self,
        root_id: NodeId,
        child: Child,
        new_tree: &Quadtree,
        new_parent_id: NodeId,
        dirty_new: &mut HashSet<NodeId>,
    ) {
        let src_child = new_tree.node(new_parent_id).child(child);
        let copied = src_child.map(|id| self.quadtree.clone_subtree_from(new_tree, id));
        self.quadtree.set_child(root_id, child, copied);
        if let Some(copied_id) = copied {
            dirty_new.extend(self.quadtree.search_leaves(Some(copied_id)));
        }
    }

    /// Recomputes `rgj_idx`/`rgj_zones`/`boundary_zone` for every node in a
    /// branch the delete-walk never visited directly (it lies outside the
    /// search quadtree's own leaves), shifting surviving indices down by the
    /// number of removed indices below them.
    fn recursive_update_rgj_index(&mut self, id: NodeId, idxs: &[usize], min_idx: usize) {
        let (rgj_idx, children) = {
            let node = self.quadtree.node(id);
            (node.rgj_idx.clone(), node.children_ids())
        };
        if rgj_idx.is_empty() || rgj_idx.iter().all(|&i| i < min_idx) {
            return;
        }
        let n_zones = self.quadtree.n_zones();
        update_rgj_index(self.quadtree.node_mut(id), idxs, n_zones);
        for child in children.into_iter().flatten() {
            self.recursive_update_rgj_index(child, idxs, min_idx);
        }
    }

    /// Synchronized recursive delete/merge of the host subtree at `root_id`
    /// against the `del_id` subtree built over exactly the removed
    /// primitives. Returns whether the caller may consider merging this
    /// child back into a single leaf.
    fn delete_walk(
        &mut self,
        root_id: Option<NodeId>,
        del_tree: &Quadtree,
        del_id: Option<NodeId>,
        idxs: &[usize],
        min_idx: usize,
        dirty_new: &mut HashSet<NodeId>,
        dirty_old: &mut HashSet<NodeId>,
    ) -> bool {
        let (root_id, del_id) = match (root_id, del_id) {
            (Some(r), Some(d)) => (r, d),
            (Some(r), None) => {
                self.recursive_update_rgj_index(r, idxs, min_idx);
                return false;
            }
            (None, _) => return false,
        };

        let n_zones = self.quadtree.n_zones();
        {
            let node = self.quadtree.node_mut(root_id);
            let mut kept_idx = SmallVec::new();
            let mut kept_zones = SmallVec::new();
            for (i, &idx) in node.rgj_idx.iter().enumerate() {
                if !idxs.contains(&idx) {
                    kept_idx.push(idx);
                    kept_zones.push(node.rgj_zones[i]);
                }
            }
            node.rgj_idx = kept_idx;
            node.rgj_zones = kept_zones;
        }

        let del_boundary_zone = del_tree.node(del_id).boundary_zone;
        {
            let node = self.quadtree.node_mut(root_id);
            if del_boundary_zone == node.boundary_zone {
                node.boundary_zone = node.rgj_zones.iter().copied().min().unwrap_or(n_zones);
            } else if node.rgj_idx.is_empty() {
                node.boundary_zone = n_zones;
            }
        }

        update_rgj_index(self.quadtree.node_mut(root_id), idxs, n_zones);

        if self.quadtree.node(root_id).leaf && self.quadtree.node(root_id).boundary_zone == n_zones {
            return true;
        }

        let mut all_mergeable = true;
        for child in CHILDREN {
            let root_child = self.quadtree.node(root_id).child(child);
            let del_child = del_tree.node(del_id).child(child);
            let mergeable = self.delete_walk(root_child, del_tree, del_child, idxs, min_idx, dirty_new, dirty_old);
            all_mergeable &= mergeable;
        }

        if all_mergeable {
            let size = self.quadtree.node(root_id).size;
            let root_bz = self.quadtree.node(root_id).boundary_zone;
            let children_bz_ok = CHILDREN.iter().all(|&c| match self.quadtree.node(root_id).child(c) {
                Some(cid) => self.quadtree.node(cid).boundary_zone == n_zones,
                None => true,
            });
            if root_bz == n_zones && children_bz_ok && size <= self.quadtree.max_sector_size {
                let old_leaves = self.quadtree.search_leaves(Some(root_id));
                self.quadtree.leaves_remove(&old_leaves);
                dirty_old.extend(old_leaves);

                let children = self.quadtree.node(root_id).children_ids();
                for child in children.into_iter().flatten() {
                    self.quadtree.free_subtree(child);
                }
                for child in CHILDREN {
                    self.quadtree.set_child(root_id, child, None);
                }
                self.quadtree.mark_leaf(root_id);
                dirty_new.insert(root_id);
                return true;
            }
        }

        false
    }
}

/// Rewrites `node`'s surviving `rgj_idx` entries to account for the removal
/// of `idxs` from the field's index space (each surviving index shifts down
/// by the count of removed indices below it), and recomputes
/// `boundary_zone` when anything was actually dropped from this node.
fn update_rgj_index(node: &mut QuadNode, idxs: &[usize], n_zones: usize) {
    let orig_idx: SmallVec<[usize; 4]> = node.rgj_idx.clone();
    let orig_zones: SmallVec<[usize; 4]> = node.rgj_zones.clone();

    let mut new_idx = SmallVec::new();
    let mut new_zones = SmallVec::new();
    let mut removed_any = false;
    for (&v, &z) in orig_idx.iter().zip(orig_zones.iter()) {
        if idxs.contains(&v) {
            removed_any = true;
            continue;
        }
        let shift = idxs.iter().filter(|&&r| r < v).count();
        new_idx.push(v - shift);
        new_zones.push(z);
    }
    node.rgj_idx = new_idx;
    node.rgj_zones = new_zones;
    if removed_any {
        node.boundary_zone = node.rgj_zones.iter().copied().min().unwrap_or(n_zones);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NullGraph;
    use nalgebra::{Matrix2, Vector2};

    fn v(x: f64, y: f64) -> Vector2<f64> {
        Vector2::new(x, y)
    }

    fn scenario_config() -> Config {
        Config {
            min_sector_size: 5.0,
            max_sector_size: f64::INFINITY,
            edge_bounds: vec![0.6, 0.4, 0.2],
            conservative: false,
        }
    }

    fn two_points_field() -> PotentialField {
        let p1 = Primitive::point(v(50.0, 50.0), Some(5.0 * Matrix2::identity())).unwrap();
        let p2 = Primitive::point(v(60.0, 60.0), Some(5.0 * Matrix2::identity())).unwrap();
        PotentialField::with_primitives(vec![p1, p2], Some(v(55.0, 55.0)), Some(v(50.0, 50.0)))
    }

    fn leaf_signature(tree: &Quadtree) -> Vec<(i64, i64, i64, usize)> {
        let mut sigs: Vec<(i64, i64, i64, usize)> = tree
            .leaves()
            .iter()
            .map(|&id| {
                let n = tree.node(id);
                ((n.center_point.x * 1e6) as i64, (n.center_point.y * 1e6) as i64, (n.size * 1e6) as i64, n.boundary_zone)
            })
            .collect();
        sigs.sort();
        sigs
    }

    #[test]
    fn add_then_remove_round_trips_s1() {
        let mut field = two_points_field();
        let mut quadtree = Quadtree::built(&field, scenario_config());
        let baseline = leaf_signature(&quadtree);

        let mut loader = HotLoader::new(&mut field, &mut quadtree, NullGraph);
        let added = loader.add_rgj(Primitive::point(v(55.0, 55.0), Some(10.0 * Matrix2::identity())).unwrap());
        loader.remove_rgj(vec![added]);

        assert_eq!(leaf_signature(&quadtree), baseline);
        assert_eq!(field.len(), 2);
    }

    #[test]
    fn add_keeps_child_rgj_idx_subset_of_parent() {
        let mut field = two_points_field();
        let mut quadtree = Quadtree::built(&field, scenario_config());
        let mut loader = HotLoader::new(&mut field, &mut quadtree, NullGraph);
        loader.add_rgj(Primitive::point(v(55.0, 55.0), Some(25.0 * Matrix2::identity())).unwrap());

        assert_invariant_subset_and_zone_order(&quadtree, quadtree.root());
    }

    #[test]
    fn remove_keeps_child_rgj_idx_subset_of_parent_s3() {
        let p1 = Primitive::point(v(50.0, 50.0), Some(5.0 * Matrix2::identity())).unwrap();
        let p2 = Primitive::point(v(60.0, 60.0), Some(5.0 * Matrix2::identity())).unwrap();
        let p3 = Primitive::point(v(60.0, 50.0), Some(5.0 * Matrix2::identity())).unwrap();
        let p4 = Primitive::point(v(50.0, 60.0), Some(5.0 * Matrix2::identity())).unwrap();
        let p5 = Primitive::point(v(55.0, 55.0), Some(25.0 * Matrix2::identity())).unwrap();
        let mut field = PotentialField::with_primitives(vec![p1, p2, p3, p4, p5], Some(v(55.0, 55.0)), Some(v(40.0, 40.0)));
        let mut quadtree = Quadtree::built(
            &field,
            Config { min_sector_size: 0.5, max_sector_size: f64::INFINITY, edge_bounds: vec![0.6, 0.4, 0.2], conservative: false },
        );

        let mut loader = HotLoader::new(&mut field, &mut quadtree, NullGraph);
        loader.remove_rgj(vec![2, 3]);

        assert_eq!(field.len(), 3);
        assert_invariant_subset_and_zone_order(&quadtree, quadtree.root());
    }

    #[test]
    fn leaves_have_no_children_after_add_and_remove() {
        let p1 = Primitive::point(v(50.0, 50.0), Some(5.0 * Matrix2::identity())).unwrap();
        let p2 = Primitive::point(v(60.0, 60.0), Some(5.0 * Matrix2::identity())).unwrap();
        let p3 = Primitive::point(v(60.0, 50.0), Some(5.0 * Matrix2::identity())).unwrap();
        let p4 = Primitive::point(v(50.0, 60.0), Some(5.0 * Matrix2::identity())).unwrap();
        let mut field = PotentialField::with_primitives(vec![p1, p2, p3, p4], Some(v(55.0, 55.0)), Some(v(40.0, 40.0)));
        let mut quadtree = Quadtree::built(&field, scenario_config());

        {
            let mut loader = HotLoader::new(&mut field, &mut quadtree, NullGraph);
            loader.add_rgj(Primitive::point(v(55.0, 55.0), Some(25.0 * Matrix2::identity())).unwrap());
        }
        assert_all_leaves_childless(&quadtree);
        assert_eq!(quadtree.search_leaves(None), *quadtree.leaves());

        {
            let mut loader = HotLoader::new(&mut field, &mut quadtree, NullGraph);
            loader.remove_rgj(vec![2, 3]);
        }
        assert_all_leaves_childless(&quadtree);
        assert_eq!(quadtree.search_leaves(None), *quadtree.leaves());
    }

    fn assert_all_leaves_childless(tree: &Quadtree) {
        for &id in tree.leaves() {
            let node = tree.node(id);
            assert!(node.children_ids().iter().all(|c| c.is_none()), "leaf {id:?} has a child");
        }
    }

    fn assert_invariant_subset_and_zone_order(tree: &Quadtree, id: Option<NodeId>) {
        let Some(id) = id else { return };
        let node = tree.node(id);
        if node.leaf {
            return;
        }
        for child in node.children_ids().into_iter().flatten() {
            let child_node = tree.node(child);
            assert!(child_node.boundary_zone >= node.boundary_zone);
            assert!(child_node.rgj_idx.iter().all(|i| node.rgj_idx.contains(i)));
        }
        for child in node.children_ids().into_iter().flatten() {
            assert_invariant_subset_and_zone_order(tree, Some(child));
        }
    }
}
