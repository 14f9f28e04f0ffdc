//! Repulsion potential fields over 2-D geometric primitives, discretized by
//! an adaptive quadtree.
//!
//! This library builds a continuous repulsion potential field from a
//! collection of geometric primitives (points, line strings, rectangles,
//! ellipses and their multi-variants), adaptively discretizes the plane into
//! a quadtree whose leaf resolution tracks field gradient, and exposes the
//! result as a navigable routing substrate. Each primitive contributes a
//! Gaussian-like repulsion well whose shape and orientation are matrix
//! parameterized; a router (not part of this crate) finds low-cost paths
//! through the union field.
//!
//! # Architecture
//!
//! - **[`Primitive`]**: tagged union of the seven supported shape kinds,
//!   exposing the repulsion-vector/squared-distance/eval/gradient kernel.
//! - **[`PotentialField`]**: ordered collection of primitives with batched
//!   aggregate evaluation.
//! - **[`Quadtree`]**: adaptive spatial index built from a field's zone
//!   classification.
//! - **[`HotLoader`]**: incremental insertion/removal of primitives that
//!   mutates an already-built quadtree in place.
//! - **[`route`]**: polyline length and equidistant interpolation helpers.
//!
//! # Performance Characteristics
//!
//! - **Build time**: O(N log N) in the number of primitives, parallelizable.
//! - **Query time**: O(log D) per point via [`Quadtree::find_quads`].
//! - **Hot-load time**: proportional to the affected subtree depth, not the
//!   whole tree.

mod field;
mod graph;
mod hotload;
mod primitive;
mod quadtree;
pub mod route;

pub use field::PotentialField;
pub use graph::{NullGraph, RoutingGraph};
pub use hotload::HotLoader;
pub use primitive::{Primitive, RepulsionMatrix};
pub use quadtree::{Config, NodeId, QuadNode, Quadtree, Zone};

/// Error types for the potential-field module.
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error("repulsion or shape matrix is singular: {0}")]
    SingularMatrix(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("mismatched index lengths: {reason}")]
    LengthMismatch { reason: String },

    #[error("GeometryCollection does not support set_coordinates")]
    UnsupportedMutation,

    #[error("empty route")]
    EmptyRoute,
}

pub type Result<T> = std::result::Result<T, FieldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        let _: fn(Vec<Primitive>, Option<nalgebra::Vector2<f64>>, Option<nalgebra::Vector2<f64>>) -> PotentialField =
            PotentialField::with_primitives;
        let _: fn(&PotentialField, Config) -> Quadtree = Quadtree::new;
        let _: fn() -> Config = Config::default;
    }
}
