//! The routing graph seam: the only surface the hot-loader talks to when
//! notifying a router of dirtied quadtree leaves. No routing algorithm
//! (A*/Dijkstra/etc.) lives in this crate -- callers inject their own.

use crate::quadtree::{NodeId, Quadtree};

/// The four coupling points between the core and an external routing graph:
/// constructing one over a built quadtree, removing a node that is about to
/// be freed or re-subdivided, refreshing neighbor pointers, and (re)building
/// edges for a set of newly active leaves.
pub trait RoutingGraph {
    /// Builds the graph's initial state over an already-built quadtree.
    fn from_quadtree(quadtree: &Quadtree) -> Self
    where
        Self: Sized;

    /// Drops `node` and any edges referencing it from the graph.
    fn remove(&mut self, node: NodeId);

    /// Recomputes the eight cached neighbor pointers on every leaf touched
    /// since the last call, ahead of [`Self::build_graph`].
    fn fill_shallow_neighbors(&mut self, quadtree: &Quadtree);

    /// (Re)builds edges for `nodes`. `overwrite_directed` controls whether
    /// existing directed edges between two members of `nodes` are replaced
    /// or left alone; the hot-loader always calls this with `false`.
    fn build_graph(&mut self, quadtree: &Quadtree, nodes: &[NodeId], overwrite_directed: bool);
}

/// A no-op [`RoutingGraph`] used by the hot-loader's own tests and by
/// callers that only need the quadtree, not a router.
#[derive(Debug, Clone, Default)]
pub struct NullGraph;

impl RoutingGraph for NullGraph {
    fn from_quadtree(_quadtree: &Quadtree) -> Self {
        NullGraph
    }

    fn remove(&mut self, _node: NodeId) {}

    fn fill_shallow_neighbors(&mut self, _quadtree: &Quadtree) {}

    fn build_graph(&mut self, _quadtree: &Quadtree, _nodes: &[NodeId], _overwrite_directed: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, PotentialField, Primitive};
    use nalgebra::Vector2;

    #[test]
    fn null_graph_accepts_every_call() {
        let p = Primitive::point(Vector2::new(0.0, 0.0), None).unwrap();
        let field = PotentialField::with_primitives(vec![p], Some(Vector2::new(0.0, 0.0)), Some(Vector2::new(10.0, 10.0)));
        let tree = Quadtree::built(&field, Config::default());
        let mut graph = NullGraph::from_quadtree(&tree);
        graph.fill_shallow_neighbors(&tree);
        graph.build_graph(&tree, &tree.search_leaves(None).into_iter().collect::<Vec<_>>(), false);
        if let Some(root) = tree.root() {
            graph.remove(root);
        }
    }
}
