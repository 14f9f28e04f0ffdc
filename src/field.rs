//! Ordered collection of primitives: the union "obstacle field" a router
//! queries through a quadtree built on top of it.

use nalgebra::Vector2;
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::primitive::{Bbox, Primitive};
use crate::route;
use crate::{FieldError, Result};

/// Above this many contributing primitives, batched evaluation switches to
/// `rayon`'s parallel iterators.
const PARALLEL_THRESHOLD: usize = 32;

fn filter_or_all(filter: Option<&[usize]>, len: usize) -> Vec<usize> {
    filter.map(|f| f.to_vec()).unwrap_or_else(|| (0..len).collect())
}

/// An ordered sequence of primitives plus the derived extent used to seed a
/// [`crate::Quadtree`] build.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PotentialField {
    primitives: Vec<Primitive>,
    center_point: Vector2<f64>,
    size: Vector2<f64>,
    auto_reload_center: bool,
}

fn suggested_size_from_center(bbox: Bbox, center: Vector2<f64>) -> f64 {
    let vals = [
        (bbox.min.x - center.x).abs(),
        (bbox.min.y - center.y).abs(),
        (bbox.max.x - center.x).abs(),
        (bbox.max.y - center.y).abs(),
    ];
    2.0 * vals.iter().cloned().fold(0.0_f64, f64::max)
}

impl PotentialField {
    fn empty() -> Self {
        PotentialField {
            primitives: Vec::new(),
            center_point: Vector2::zeros(),
            size: Vector2::zeros(),
            auto_reload_center: true,
        }
    }

    /// Builds a field from an initial primitive batch. `center_point`/`size`
    /// are derived from the union bounding box when not supplied.
    pub fn with_primitives(
        primitives: Vec<Primitive>,
        center_point: Option<Vector2<f64>>,
        size: Option<Vector2<f64>>,
    ) -> Self {
        let mut field = Self::empty();
        field.primitives = primitives;

        if center_point.is_none() {
            field.auto_reload_center = true;
            if !field.primitives.is_empty() {
                let bbox = field.bbox();
                let center = bbox.center();
                let suggested = suggested_size_from_center(bbox, center);
                field.center_point = center;
                field.size = size.unwrap_or(Vector2::new(suggested, suggested));
            }
        } else {
            field.auto_reload_center = false;
            field.center_point = center_point.unwrap();
            if !field.primitives.is_empty() {
                let bbox = field.bbox();
                let suggested = suggested_size_from_center(bbox, field.center_point);
                field.size = size.unwrap_or(Vector2::new(suggested, suggested));
            } else if let Some(s) = size {
                field.size = s;
            }
        }

        field
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn center_point(&self) -> Vector2<f64> {
        self.center_point
    }

    pub fn size(&self) -> Vector2<f64> {
        self.size
    }

    pub fn set_center_point(&mut self, center_point: Vector2<f64>) {
        self.center_point = center_point;
    }

    pub fn set_size(&mut self, size: Vector2<f64>) {
        self.size = size;
    }

    pub fn get(&self, idx: usize) -> Option<&Primitive> {
        self.primitives.get(idx)
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn add(&mut self, primitive: Primitive) {
        self.primitives.push(primitive);
        if self.auto_reload_center {
            self.center_point = self.bbox().center();
        }
    }

    /// Removes primitives by index, in descending order internally, so the
    /// indices of surviving primitives remain stable and contiguous
    /// afterward. Accepts a single index or any collection of them.
    pub fn del<I: IntoIterator<Item = usize>>(&mut self, indices: I) {
        let mut idx: Vec<usize> = indices.into_iter().collect();
        idx.sort_unstable();
        idx.dedup();
        for (removed_so_far, i) in idx.into_iter().enumerate() {
            self.primitives.remove(i - removed_so_far);
        }
        if self.auto_reload_center && !self.primitives.is_empty() {
            self.center_point = self.bbox().center();
        }
    }

    pub fn bbox(&self) -> Bbox {
        let boxes: Vec<Bbox> = self.primitives.iter().map(|p| p.bbox()).collect();
        Bbox::from_boxes(&boxes)
    }

    pub fn reload_bbox(&self) -> Bbox {
        self.bbox()
    }

    pub fn reload_center_point(&mut self, toggle: bool, recalculate_size: bool) -> Vector2<f64> {
        self.auto_reload_center = toggle;
        if toggle && !self.primitives.is_empty() {
            let bbox = self.bbox();
            let center = bbox.center();
            if recalculate_size {
                let suggested = suggested_size_from_center(bbox, center);
                self.size = Vector2::new(suggested, suggested);
            }
            self.center_point = center;
        }
        self.center_point
    }

    pub fn get_extent(&self, margin: f64) -> [f64; 4] {
        let half = self.size / 2.0;
        [
            self.center_point.x - half.x - margin,
            self.center_point.x + half.x + margin,
            self.center_point.y - half.y - margin,
            self.center_point.y + half.y + margin,
        ]
    }

    pub fn in_bbox(&self, point: Vector2<f64>) -> bool {
        self.primitives.iter().any(|p| p.in_bbox(point))
    }

    pub fn find_bbox(&self, point: Vector2<f64>) -> Vec<usize> {
        self.primitives
            .iter()
            .enumerate()
            .filter(|(_, p)| p.in_bbox(point))
            .map(|(i, _)| i)
            .collect()
    }

    /// Elementwise maximum of `eval` across all (or filtered) primitives:
    /// the outer envelope of the union of obstacles.
    pub fn eval(&self, points: &[Vector2<f64>], filter: Option<&[usize]>) -> Vec<f64> {
        let idxs = filter_or_all(filter, self.primitives.len());
        if idxs.is_empty() {
            return vec![0.0; points.len()];
        }

        let rows: Vec<Vec<f64>> = if idxs.len() >= PARALLEL_THRESHOLD {
            idxs.par_iter().map(|&i| self.primitives[i].eval(points)).collect()
        } else {
            idxs.iter().map(|&i| self.primitives[i].eval(points)).collect()
        };

        let mut out = vec![f64::NEG_INFINITY; points.len()];
        for row in rows {
            for (o, v) in out.iter_mut().zip(row) {
                if v > *o {
                    *o = v;
                }
            }
        }
        out
    }

    /// Concatenates each filtered primitive's own (batch) repulsion vectors,
    /// in filter order -- this is *not* a per-point min-selection across
    /// primitives (see [`Self::squared_dist`] / [`Self::gradient`] for that).
    pub fn repulsion_vectors(&self, points: &[Vector2<f64>], filter: Option<&[usize]>) -> Vec<Vector2<f64>> {
        if self.primitives.is_empty() {
            return vec![Vector2::new(f64::INFINITY, f64::INFINITY); points.len()];
        }
        let idxs = filter_or_all(filter, self.primitives.len());
        idxs.iter().flat_map(|&i| self.primitives[i].repulsion_vector(points)).collect()
    }

    /// As [`Self::repulsion_vectors`], but also returns the source
    /// primitive index for every output row.
    pub fn repulsion_vectors_with_ref(
        &self,
        points: &[Vector2<f64>],
        filter: Option<&[usize]>,
    ) -> (Vec<Vector2<f64>>, Vec<usize>) {
        if self.primitives.is_empty() {
            return (vec![Vector2::new(f64::INFINITY, f64::INFINITY); points.len()], Vec::new());
        }
        let idxs = filter_or_all(filter, self.primitives.len());
        let mut vectors = Vec::new();
        let mut refs = Vec::new();
        for &i in &idxs {
            let v = self.primitives[i].repulsion_vector(points);
            refs.extend(std::iter::repeat(i).take(v.len()));
            vectors.extend(v);
        }
        (vectors, refs)
    }

    fn squared_dist_matrix(&self, points: &[Vector2<f64>], filter: Option<&[usize]>) -> (Vec<usize>, Vec<Vec<f64>>) {
        let idxs = filter_or_all(filter, self.primitives.len());
        let rows: Vec<Vec<f64>> = if idxs.len() >= PARALLEL_THRESHOLD {
            idxs.par_iter().map(|&i| self.primitives[i].squared_dist(points)).collect()
        } else {
            idxs.iter().map(|&i| self.primitives[i].squared_dist(points)).collect()
        };
        (idxs, rows)
    }

    /// Elementwise minimum squared distance across all (or filtered)
    /// primitives. Empty fields return `+inf` with a warning.
    pub fn squared_dist(&self, points: &[Vector2<f64>], filter: Option<&[usize]>) -> Vec<f64> {
        self.squared_dist_with_ref(points, filter).0
    }

    /// As [`Self::squared_dist`], also returning the argmin primitive index
    /// per query point (`usize::MAX` when the field is empty).
    pub fn squared_dist_with_ref(&self, points: &[Vector2<f64>], filter: Option<&[usize]>) -> (Vec<f64>, Vec<usize>) {
        if self.primitives.is_empty() {
            warn!("There are not any primitives in the field");
            return (vec![f64::INFINITY; points.len()], vec![usize::MAX; points.len()]);
        }

        let (idxs, rows) = self.squared_dist_matrix(points, filter);
        let n = points.len();
        let mut best = vec![f64::INFINITY; n];
        let mut best_idx = vec![usize::MAX; n];
        for (row, &src) in rows.iter().zip(&idxs) {
            for i in 0..n {
                if row[i] < best[i] {
                    best[i] = row[i];
                    best_idx[i] = src;
                }
            }
        }
        (best, best_idx)
    }

    /// Evaluates each query point against exactly the primitive named by
    /// `idxs[i]`. Lengths must match.
    pub fn squared_dist_per(&self, points: &[Vector2<f64>], idxs: &[usize]) -> Result<Vec<f64>> {
        if points.len() != idxs.len() {
            return Err(FieldError::LengthMismatch {
                reason: "squared_dist_per: points and idxs must have the same length".into(),
            });
        }
        Ok(points
            .iter()
            .zip(idxs)
            .map(|(&p, &idx)| self.primitives[idx].squared_dist(&[p])[0])
            .collect())
    }

    /// As [`Self::squared_dist_per`] but returning `eval` values.
    pub fn eval_per(&self, points: &[Vector2<f64>], idxs: &[usize]) -> Result<Vec<f64>> {
        if points.len() != idxs.len() {
            return Err(FieldError::LengthMismatch {
                reason: "eval_per: points and idxs must have the same length".into(),
            });
        }
        Ok(points
            .iter()
            .zip(idxs)
            .map(|(&p, &idx)| self.primitives[idx].eval(&[p])[0])
            .collect())
    }

    /// For each query, evaluates the gradient of the dominant (argmin
    /// squared-distance) primitive -- only that obstacle contributes to the
    /// outer envelope's subgradient.
    pub fn gradient(&self, points: &[Vector2<f64>]) -> Vec<Vector2<f64>> {
        if self.primitives.is_empty() {
            return vec![Vector2::zeros(); points.len()];
        }
        let (_, idxs) = self.squared_dist_with_ref(points, None);
        points
            .iter()
            .zip(idxs)
            .map(|(&p, idx)| self.primitives[idx].gradient(&[p])[0])
            .collect()
    }

    pub fn estimate_route_area(&self, route: &[Vector2<f64>], step: f64, n: usize) -> f64 {
        let sample = route::interpolate_along_route(route, step, n);
        let points: &[Vector2<f64>] = if n == 0 { &sample.points } else { &sample.points[..sample.points.len() - 1] };
        let values = self.eval(points, None);
        values.iter().sum::<f64>() * sample.step
    }

    pub fn estimate_route_highest_potential(&self, route: &[Vector2<f64>], step: f64, n: usize) -> f64 {
        let sample = route::interpolate_along_route(route, step, n);
        let points: &[Vector2<f64>] = if n == 0 { &sample.points } else { &sample.points[..sample.points.len() - 1] };
        let values = self.eval(points, None);
        values.into_iter().fold(f64::NEG_INFINITY, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f64, y: f64) -> Vector2<f64> {
        Vector2::new(x, y)
    }

    fn two_points_field() -> PotentialField {
        let p1 = Primitive::point(v(50.0, 50.0), Some(5.0 * nalgebra::Matrix2::identity())).unwrap();
        let p2 = Primitive::point(v(60.0, 60.0), Some(5.0 * nalgebra::Matrix2::identity())).unwrap();
        PotentialField::with_primitives(vec![p1, p2], Some(v(55.0, 55.0)), Some(v(50.0, 50.0)))
    }

    #[test]
    fn eval_is_max_across_primitives() {
        let field = two_points_field();
        let e1 = field.get(0).unwrap().eval(&[v(52.0, 50.0)])[0];
        let e2 = field.get(1).unwrap().eval(&[v(52.0, 50.0)])[0];
        let combined = field.eval(&[v(52.0, 50.0)], None)[0];
        assert_eq!(combined, e1.max(e2));
    }

    #[test]
    fn squared_dist_empty_field_warns_and_returns_inf() {
        let field = PotentialField::with_primitives(vec![], None, None);
        let dist = field.squared_dist(&[v(0.0, 0.0)], None);
        assert!(dist[0].is_infinite());
    }

    #[test]
    fn eval_empty_field_returns_zero_s4() {
        let field = PotentialField::with_primitives(vec![], None, None);
        let out = field.eval(&[v(0.0, 0.0)], None);
        assert_eq!(out, vec![0.0]);
    }

    #[test]
    fn eval_per_length_mismatch_errs() {
        let field = two_points_field();
        let err = field.eval_per(&[v(0.0, 0.0)], &[0, 1]);
        assert!(err.is_err());
    }

    #[test]
    fn del_keeps_surviving_indices_stable() {
        let mut field = two_points_field();
        let p3 = Primitive::point(v(70.0, 70.0), None).unwrap();
        field.add(p3);
        field.del(vec![0]);
        assert_eq!(field.len(), 2);
        assert_eq!(field.get(0).unwrap().center_point(), v(60.0, 60.0));
        assert_eq!(field.get(1).unwrap().center_point(), v(70.0, 70.0));
    }
}
