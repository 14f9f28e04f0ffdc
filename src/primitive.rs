//! Geometry kernel: per-shape repulsion vector, squared distance, eval and
//! gradient, plus bounding boxes.
//!
//! `x` is always assumed to be a batch of query points in 2-D Euclidean
//! space. A primitive's repulsion vector points from the nearest (in its own
//! Mahalanobis sense) point of the primitive toward the query; it is zero
//! on or inside the primitive.

use std::collections::BTreeMap;

use nalgebra::{Matrix2, SymmetricEigen, Vector2};
use smallvec::SmallVec;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{FieldError, Result};

/// The 2x2 SPD matrix parameterizing a primitive's Mahalanobis metric or an
/// ellipse's shape.
pub type RepulsionMatrix = Matrix2<f64>;

const ELLIPSE_DEN_ERROR_BUFFER: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bbox {
    pub min: Vector2<f64>,
    pub max: Vector2<f64>,
}

impl Bbox {
    fn from_points<I: IntoIterator<Item = Vector2<f64>>>(points: I) -> Self {
        let mut min = Vector2::new(f64::INFINITY, f64::INFINITY);
        let mut max = Vector2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Bbox { min, max }
    }

    pub fn from_boxes(bboxes: &[Bbox]) -> Bbox {
        Bbox::from_points(bboxes.iter().flat_map(|b| [b.min, b.max]))
    }

    pub fn contains(&self, p: Vector2<f64>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn center(&self) -> Vector2<f64> {
        (self.min + self.max) / 2.0
    }
}

/// A primitive's repulsion metric `A`, plus its lazily-derived inverse and
/// gradient matrix `G = A^-1 + (A^-1)^T`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct Metric {
    a: RepulsionMatrix,
    a_inv: RepulsionMatrix,
    grad_matrix: RepulsionMatrix,
}

impl Metric {
    fn new(a: RepulsionMatrix) -> Result<Self> {
        let a_inv = a
            .try_inverse()
            .ok_or_else(|| FieldError::SingularMatrix("repulsion matrix A".into()))?;
        let grad_matrix = a_inv + a_inv.transpose();
        Ok(Metric { a, a_inv, grad_matrix })
    }

    fn identity() -> Self {
        Metric::new(RepulsionMatrix::identity()).expect("identity matrix is invertible")
    }

    /// `scaled=false` gives ordinary Euclidean distance; `scaled=true,
    /// inverted=true` (the default used throughout) gives `A^-1`; `scaled=true,
    /// inverted=false` gives `A` itself.
    fn dist_matrix(&self, scaled: bool, inverted: bool) -> RepulsionMatrix {
        if !scaled {
            RepulsionMatrix::identity()
        } else if inverted {
            self.a_inv
        } else {
            self.a
        }
    }

    fn bilinear(&self, v: Vector2<f64>, scaled: bool, inverted: bool) -> f64 {
        let m = self.dist_matrix(scaled, inverted);
        (v.transpose() * m * v)[(0, 0)]
    }
}

fn select_min_by_metric(metric: &Metric, candidates: &[Vector2<f64>]) -> Vector2<f64> {
    let mut best = candidates[0];
    let mut best_dist = metric.bilinear(best, true, true);
    for &c in &candidates[1..] {
        let d = metric.bilinear(c, true, true);
        if d < best_dist {
            best = c;
            best_dist = d;
        }
    }
    best
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct LineStringGeom {
    segments: Vec<(Vector2<f64>, Vector2<f64>)>,
}

impl LineStringGeom {
    fn new(coords: &[Vector2<f64>]) -> Self {
        let segments = coords.windows(2).map(|w| (w[0], w[1])).collect();
        LineStringGeom { segments }
    }

    fn bbox(&self) -> Bbox {
        Bbox::from_points(
            self.segments
                .iter()
                .flat_map(|&(a, b)| [a, b]),
        )
    }

    fn repulsion_vector_one_segment(a: Vector2<f64>, b: Vector2<f64>, p: Vector2<f64>) -> Vector2<f64> {
        let ab = b - a;
        let ap = p - a;
        let denom = ab.dot(&ab);
        let t = if denom > 0.0 { (ap.dot(&ab) / denom).clamp(0.0, 1.0) } else { 0.0 };
        let closest = a + ab * t;
        p - closest
    }

    fn candidates(&self, p: Vector2<f64>) -> Vec<Vector2<f64>> {
        self.segments
            .iter()
            .map(|&(a, b)| Self::repulsion_vector_one_segment(a, b, p))
            .collect()
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct EllipseGeom {
    center: Vector2<f64>,
    shape: RepulsionMatrix,
    shape_inv: RepulsionMatrix,
}

impl EllipseGeom {
    fn new(center: Vector2<f64>, shape: RepulsionMatrix) -> Result<Self> {
        let shape_inv = shape
            .try_inverse()
            .ok_or_else(|| FieldError::SingularMatrix("ellipse shape matrix B".into()))?;
        Ok(EllipseGeom { center, shape, shape_inv })
    }

    fn bbox(&self) -> Bbox {
        let eig = SymmetricEigen::new(self.shape);
        let sqrt_eigvals = eig.eigenvalues.map(|v| v.max(0.0).sqrt());
        // eigenvectors of a symmetric matrix are orthonormal, so the inverse is the transpose.
        let vectors = eig.eigenvectors * Matrix2::from_diagonal(&sqrt_eigvals) * eig.eigenvectors.transpose();
        let half_diag_0 = vectors.column(0).into_owned();
        let half_diag_1 = vectors.column(1).into_owned();
        Bbox::from_points([
            self.center + half_diag_0,
            self.center + half_diag_1,
            self.center - half_diag_0,
            self.center - half_diag_1,
        ])
    }

    fn repulsion_vector(&self, p: Vector2<f64>) -> Vector2<f64> {
        let u = p - self.center;
        let b_inv_u = self.shape_inv.transpose() * u;
        let den = b_inv_u.norm().max(ELLIPSE_DEN_ERROR_BUFFER);
        (1.0 - 1.0 / den).max(0.0) * u
    }
}

fn rectangle_repulsion_vector(c0: Vector2<f64>, c1: Vector2<f64>, p: Vector2<f64>) -> Vector2<f64> {
    let diff01 = (c0 - c1).abs();
    let d0 = (p - c0).abs();
    let d1 = (p - c1).abs();
    let sign = Vector2::new(
        (p.x - c0.x).signum(),
        (p.y - c0.y).signum(),
    );
    Vector2::new(
        0.5 * sign.x * (d0.x + d1.x - diff01.x),
        0.5 * sign.y * (d0.y + d1.y - diff01.y),
    )
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
enum Kind {
    Point(Vector2<f64>),
    LineString(LineStringGeom),
    Rectangle(Vector2<f64>, Vector2<f64>),
    Ellipse(EllipseGeom),
    MultiPoint(Vec<Vector2<f64>>),
    MultiLineString(Vec<LineStringGeom>),
    MultiRectangle(Vec<(Vector2<f64>, Vector2<f64>)>),
    MultiEllipse(Vec<EllipseGeom>),
    GeometryCollection(Vec<Primitive>),
}

/// Tagged union over the seven supported shape kinds, plus the repulsion
/// metric `A`, per-sub-unit bounding boxes, and passthrough properties.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Primitive {
    kind: Kind,
    metric: Option<Metric>,
    sub_bboxes: SmallVec<[Bbox; 1]>,
    pub properties: Option<BTreeMap<String, String>>,
}

impl Primitive {
    fn finish(kind: Kind, metric: Option<Metric>, sub_bboxes: SmallVec<[Bbox; 1]>) -> Self {
        Primitive { kind, metric, sub_bboxes, properties: None }
    }

    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn point(c: Vector2<f64>, repulsion: Option<RepulsionMatrix>) -> Result<Self> {
        let metric = Metric::new(repulsion.unwrap_or_else(RepulsionMatrix::identity))?;
        let bbox = Bbox::from_points([c]);
        Ok(Self::finish(Kind::Point(c), Some(metric), SmallVec::from_elem(bbox, 1)))
    }

    pub fn line_string(coords: Vec<Vector2<f64>>, repulsion: Option<RepulsionMatrix>) -> Result<Self> {
        if coords.len() < 2 {
            return Err(FieldError::InvalidGeometry("LineString needs at least 2 vertices".into()));
        }
        let metric = Metric::new(repulsion.unwrap_or_else(RepulsionMatrix::identity))?;
        let geom = LineStringGeom::new(&coords);
        let bbox = geom.bbox();
        Ok(Self::finish(Kind::LineString(geom), Some(metric), SmallVec::from_elem(bbox, 1)))
    }

    pub fn rectangle(c0: Vector2<f64>, c1: Vector2<f64>, repulsion: Option<RepulsionMatrix>) -> Result<Self> {
        let metric = Metric::new(repulsion.unwrap_or_else(RepulsionMatrix::identity))?;
        let bbox = Bbox::from_points([c0, c1]);
        Ok(Self::finish(Kind::Rectangle(c0, c1), Some(metric), SmallVec::from_elem(bbox, 1)))
    }

    pub fn ellipse(center: Vector2<f64>, shape: RepulsionMatrix, repulsion: Option<RepulsionMatrix>) -> Result<Self> {
        let metric = Metric::new(repulsion.unwrap_or_else(RepulsionMatrix::identity))?;
        let geom = EllipseGeom::new(center, shape)?;
        let bbox = geom.bbox();
        Ok(Self::finish(Kind::Ellipse(geom), Some(metric), SmallVec::from_elem(bbox, 1)))
    }

    pub fn multi_point(coords: Vec<Vector2<f64>>, repulsion: Option<RepulsionMatrix>) -> Result<Self> {
        if coords.is_empty() {
            return Err(FieldError::InvalidGeometry("MultiPoint needs at least 1 point".into()));
        }
        let metric = Metric::new(repulsion.unwrap_or_else(RepulsionMatrix::identity))?;
        let bboxes: SmallVec<[Bbox; 1]> = coords.iter().map(|&c| Bbox::from_points([c])).collect();
        Ok(Self::finish(Kind::MultiPoint(coords), Some(metric), bboxes))
    }

    pub fn multi_line_string(coords: Vec<Vec<Vector2<f64>>>, repulsion: Option<RepulsionMatrix>) -> Result<Self> {
        let metric = Metric::new(repulsion.unwrap_or_else(RepulsionMatrix::identity))?;
        let mut geoms = Vec::with_capacity(coords.len());
        let mut bboxes = SmallVec::new();
        for line in coords {
            if line.len() < 2 {
                return Err(FieldError::InvalidGeometry("MultiLineString sub-line needs at least 2 vertices".into()));
            }
            let geom = LineStringGeom::new(&line);
            bboxes.push(geom.bbox());
            geoms.push(geom);
        }
        Ok(Self::finish(Kind::MultiLineString(geoms), Some(metric), bboxes))
    }

    pub fn multi_rectangle(rects: Vec<(Vector2<f64>, Vector2<f64>)>, repulsion: Option<RepulsionMatrix>) -> Result<Self> {
        let metric = Metric::new(repulsion.unwrap_or_else(RepulsionMatrix::identity))?;
        let bboxes: SmallVec<[Bbox; 1]> = rects.iter().map(|&(a, b)| Bbox::from_points([a, b])).collect();
        Ok(Self::finish(Kind::MultiRectangle(rects), Some(metric), bboxes))
    }

    pub fn multi_ellipse(ellipses: Vec<(Vector2<f64>, RepulsionMatrix)>, repulsion: Option<RepulsionMatrix>) -> Result<Self> {
        let metric = Metric::new(repulsion.unwrap_or_else(RepulsionMatrix::identity))?;
        let mut geoms = Vec::with_capacity(ellipses.len());
        let mut bboxes = SmallVec::new();
        for (center, shape) in ellipses {
            let geom = EllipseGeom::new(center, shape)?;
            bboxes.push(geom.bbox());
            geoms.push(geom);
        }
        Ok(Self::finish(Kind::MultiEllipse(geoms), Some(metric), bboxes))
    }

    pub fn geometry_collection(parts: Vec<Primitive>) -> Result<Self> {
        if parts.is_empty() {
            return Err(FieldError::InvalidGeometry("GeometryCollection needs at least 1 member".into()));
        }
        for part in &parts {
            if matches!(part.kind, Kind::GeometryCollection(_)) {
                return Err(FieldError::InvalidGeometry("GeometryCollection cannot contain itself".into()));
            }
        }
        let bboxes: SmallVec<[Bbox; 1]> = parts.iter().flat_map(|p| p.sub_bboxes.clone()).collect();
        Ok(Self::finish(Kind::GeometryCollection(parts), None, bboxes))
    }

    pub fn bbox(&self) -> Bbox {
        Bbox::from_boxes(&self.sub_bboxes)
    }

    pub fn center_point(&self) -> Vector2<f64> {
        self.bbox().center()
    }

    /// Disallowed in-place for `GeometryCollection` (see [`crate::FieldError::UnsupportedMutation`]);
    /// recreate it via [`Primitive::geometry_collection`] instead.
    pub fn set_coordinates(&mut self, coords: PrimitiveCoords) -> Result<()> {
        match (&mut self.kind, coords) {
            (Kind::GeometryCollection(_), _) => Err(FieldError::UnsupportedMutation),
            (Kind::Point(c), PrimitiveCoords::Point(new)) => {
                *c = new;
                self.sub_bboxes = SmallVec::from_elem(Bbox::from_points([new]), 1);
                Ok(())
            }
            (Kind::LineString(geom), PrimitiveCoords::LineString(new)) => {
                if new.len() < 2 {
                    return Err(FieldError::InvalidGeometry("LineString needs at least 2 vertices".into()));
                }
                *geom = LineStringGeom::new(&new);
                self.sub_bboxes = SmallVec::from_elem(geom.bbox(), 1);
                Ok(())
            }
            (Kind::Rectangle(c0, c1), PrimitiveCoords::Rectangle(a, b)) => {
                *c0 = a;
                *c1 = b;
                self.sub_bboxes = SmallVec::from_elem(Bbox::from_points([a, b]), 1);
                Ok(())
            }
            (Kind::Ellipse(geom), PrimitiveCoords::Point(c)) => {
                geom.center = c;
                self.sub_bboxes = SmallVec::from_elem(geom.bbox(), 1);
                Ok(())
            }
            _ => Err(FieldError::InvalidGeometry("coordinate shape does not match primitive kind".into())),
        }
    }

    pub fn in_bbox(&self, p: Vector2<f64>) -> bool {
        match &self.kind {
            Kind::MultiPoint(pts) => pts.iter().any(|&c| c == p),
            Kind::GeometryCollection(parts) => parts.iter().any(|rgj| rgj.in_bbox(p)),
            _ => self.sub_bboxes.iter().any(|b| b.contains(p)),
        }
    }

    /// The metric used to rank candidate repulsion vectors across
    /// sub-units. `GeometryCollection` has no metric of its own: ranking is
    /// delegated to each member's own metric inside [`Self::squared_dist`]
    /// and [`Self::repulsion_vector`].
    fn dist_matrix(&self, scaled: bool, inverted: bool) -> Option<RepulsionMatrix> {
        self.metric.as_ref().map(|m| m.dist_matrix(scaled, inverted))
    }

    pub fn repulsion_vector(&self, points: &[Vector2<f64>]) -> Vec<Vector2<f64>> {
        match &self.kind {
            Kind::Point(c) => points.iter().map(|&p| p - c).collect(),
            Kind::LineString(geom) => {
                let metric = self.metric.as_ref().unwrap();
                points
                    .iter()
                    .map(|&p| select_min_by_metric(metric, &geom.candidates(p)))
                    .collect()
            }
            Kind::Rectangle(c0, c1) => points.iter().map(|&p| rectangle_repulsion_vector(*c0, *c1, p)).collect(),
            Kind::Ellipse(geom) => points.iter().map(|&p| geom.repulsion_vector(p)).collect(),
            Kind::MultiPoint(pts) => {
                let metric = self.metric.as_ref().unwrap();
                points
                    .iter()
                    .map(|&p| {
                        let candidates: Vec<Vector2<f64>> = pts.iter().map(|&c| p - c).collect();
                        select_min_by_metric(metric, &candidates)
                    })
                    .collect()
            }
            Kind::MultiLineString(geoms) => {
                let metric = self.metric.as_ref().unwrap();
                points
                    .iter()
                    .map(|&p| {
                        let candidates: Vec<Vector2<f64>> =
                            geoms.iter().flat_map(|g| g.candidates(p)).collect();
                        select_min_by_metric(metric, &candidates)
                    })
                    .collect()
            }
            Kind::MultiRectangle(rects) => {
                let metric = self.metric.as_ref().unwrap();
                points
                    .iter()
                    .map(|&p| {
                        let candidates: Vec<Vector2<f64>> =
                            rects.iter().map(|&(a, b)| rectangle_repulsion_vector(a, b, p)).collect();
                        select_min_by_metric(metric, &candidates)
                    })
                    .collect()
            }
            Kind::MultiEllipse(geoms) => {
                let metric = self.metric.as_ref().unwrap();
                points
                    .iter()
                    .map(|&p| {
                        let candidates: Vec<Vector2<f64>> = geoms.iter().map(|g| g.repulsion_vector(p)).collect();
                        select_min_by_metric(metric, &candidates)
                    })
                    .collect()
            }
            Kind::GeometryCollection(parts) => points
                .iter()
                .map(|&p| {
                    let p_batch = [p];
                    let mut best = parts[0].repulsion_vector(&p_batch)[0];
                    let mut best_dist = parts[0].squared_dist(&p_batch)[0];
                    for part in &parts[1..] {
                        let v = part.repulsion_vector(&p_batch)[0];
                        let d = part.squared_dist(&p_batch)[0];
                        if d < best_dist {
                            best = v;
                            best_dist = d;
                        }
                    }
                    best
                })
                .collect(),
        }
    }

    /// Exposes the per-segment (non min-selected) tensor for `LineString`
    /// primitives, segment-major: `result[segment][point]`.
    pub fn segment_repulsion_vectors(&self, points: &[Vector2<f64>]) -> Option<Vec<Vec<Vector2<f64>>>> {
        let segments = match &self.kind {
            Kind::LineString(geom) => &geom.segments,
            _ => return None,
        };
        Some(
            segments
                .iter()
                .map(|&(a, b)| {
                    points
                        .iter()
                        .map(|&p| LineStringGeom::repulsion_vector_one_segment(a, b, p))
                        .collect()
                })
                .collect(),
        )
    }

    pub fn squared_dist(&self, points: &[Vector2<f64>]) -> Vec<f64> {
        match (&self.kind, &self.metric) {
            (Kind::GeometryCollection(parts), _) => points
                .iter()
                .map(|&p| {
                    let p_batch = [p];
                    parts
                        .iter()
                        .map(|part| part.squared_dist(&p_batch)[0])
                        .fold(f64::INFINITY, f64::min)
                })
                .collect(),
            (_, Some(metric)) => {
                let vectors = self.repulsion_vector(points);
                vectors.into_iter().map(|v| metric.bilinear(v, true, true)).collect()
            }
            (_, None) => unreachable!("only GeometryCollection has no metric"),
        }
    }

    pub fn eval(&self, points: &[Vector2<f64>]) -> Vec<f64> {
        self.squared_dist(points).into_iter().map(|d| (-d).exp()).collect()
    }

    pub fn gradient(&self, points: &[Vector2<f64>]) -> Vec<Vector2<f64>> {
        match &self.kind {
            Kind::GeometryCollection(parts) => points
                .iter()
                .map(|&p| {
                    let p_batch = [p];
                    let mut best_idx = 0;
                    let mut best_dist = parts[0].squared_dist(&p_batch)[0];
                    for (i, part) in parts.iter().enumerate().skip(1) {
                        let d = part.squared_dist(&p_batch)[0];
                        if d < best_dist {
                            best_dist = d;
                            best_idx = i;
                        }
                    }
                    parts[best_idx].gradient(&p_batch)[0]
                })
                .collect(),
            _ => {
                let metric = self.metric.as_ref().unwrap();
                let evals = self.eval(points);
                let vectors = self.repulsion_vector(points);
                evals
                    .into_iter()
                    .zip(vectors)
                    .map(|(e, v)| -e * (metric.grad_matrix * v))
                    .collect()
            }
        }
    }
}

/// Per-kind coordinate payload accepted by [`Primitive::set_coordinates`].
pub enum PrimitiveCoords {
    Point(Vector2<f64>),
    LineString(Vec<Vector2<f64>>),
    Rectangle(Vector2<f64>, Vector2<f64>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f64, y: f64) -> Vector2<f64> {
        Vector2::new(x, y)
    }

    #[test]
    fn point_repulsion_and_eval() {
        let p = Primitive::point(v(0.0, 0.0), None).unwrap();
        assert_eq!(p.repulsion_vector(&[v(3.0, 4.0)])[0], v(3.0, 4.0));
        assert_eq!(p.eval(&[v(0.0, 0.0)])[0], 1.0);
        assert!(p.eval(&[v(1.0, 0.0)])[0] < 1.0);
    }

    #[test]
    fn line_string_projects_and_clamps() {
        let ls = Primitive::line_string(vec![v(0.0, 0.0), v(10.0, 0.0)], None).unwrap();
        assert_eq!(ls.repulsion_vector(&[v(5.0, 3.0)])[0], v(0.0, 3.0));
        assert_eq!(ls.repulsion_vector(&[v(-5.0, 0.0)])[0], v(-5.0, 0.0));
        assert_eq!(ls.repulsion_vector(&[v(15.0, 0.0)])[0], v(5.0, 0.0));
    }

    #[test]
    fn rectangle_is_zero_inside() {
        let rect = Primitive::rectangle(v(0.0, 0.0), v(10.0, 10.0), None).unwrap();
        assert_eq!(rect.repulsion_vector(&[v(5.0, 5.0)])[0], v(0.0, 0.0));
        assert_eq!(rect.eval(&[v(5.0, 5.0)])[0], 1.0);
        assert!(rect.repulsion_vector(&[v(15.0, 5.0)])[0].x > 0.0);
    }

    #[test]
    fn ellipse_scenario_s6() {
        let e = Primitive::ellipse(v(0.0, 0.0), RepulsionMatrix::identity(), None).unwrap();
        assert_eq!(e.eval(&[v(0.0, 0.0)])[0], 1.0);
        assert!((e.eval(&[v(1.0, 0.0)])[0] - 1.0).abs() < 1e-12);
        let far = e.eval(&[v(2.0, 0.0)])[0];
        assert!((far - (-1.0f64).exp()).abs() < 1e-9);

        let grad = e.gradient(&[v(2.0, 0.0)])[0];
        assert!(grad.x < 0.0);
        assert!((grad.x - (-(-1.0f64).exp() * 2.0)).abs() < 1e-9);
        assert!(grad.y.abs() < 1e-12);
    }

    #[test]
    fn multi_point_selects_nearest() {
        let mp = Primitive::multi_point(vec![v(0.0, 0.0), v(10.0, 10.0)], None).unwrap();
        let vec_near = mp.repulsion_vector(&[v(1.0, 0.0)])[0];
        assert_eq!(vec_near, v(1.0, 0.0));
    }

    #[test]
    fn geometry_collection_cannot_nest() {
        let inner = Primitive::geometry_collection(vec![Primitive::point(v(0.0, 0.0), None).unwrap()]).unwrap();
        let err = Primitive::geometry_collection(vec![inner]);
        assert!(err.is_err());
    }

    #[test]
    fn geometry_collection_set_coordinates_unsupported() {
        let mut gc = Primitive::geometry_collection(vec![Primitive::point(v(0.0, 0.0), None).unwrap()]).unwrap();
        let err = gc.set_coordinates(PrimitiveCoords::Point(v(1.0, 1.0)));
        assert!(matches!(err, Err(FieldError::UnsupportedMutation)));
    }

    #[test]
    fn eval_equals_one_iff_on_primitive() {
        let rect = Primitive::rectangle(v(0.0, 0.0), v(4.0, 4.0), None).unwrap();
        for p in [v(0.0, 0.0), v(4.0, 4.0), v(2.0, 0.0), v(2.0, 2.0)] {
            assert_eq!(rect.eval(&[p])[0], 1.0);
            assert_eq!(rect.repulsion_vector(&[p])[0], v(0.0, 0.0));
        }
        assert!(rect.eval(&[v(5.0, 0.0)])[0] < 1.0);
    }
}
