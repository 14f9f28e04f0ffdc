//! Route geometry helpers: polyline length and equidistant interpolation
//! along a path, used to sample a [`crate::PotentialField`] for route-cost
//! integrals.

use nalgebra::Vector2;

/// Result of [`interpolate_along_route`]: the sampled points, the realized
/// step size and the realized sample count (both may differ from the
/// requested `step` when `n > 0` was requested instead).
#[derive(Debug, Clone)]
pub struct RouteSamples {
    pub points: Vec<Vector2<f64>>,
    pub step: f64,
    pub n: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
mod imp {
    use super::*;

    /// Sum of pairwise Euclidean segment lengths of a continuous polyline.
    pub fn route_distance(route: &[Vector2<f64>]) -> f64 {
        #[cfg(feature = "profiling")]
        profiling::scope!("route::route_distance");
        route.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    /// As [`route_distance`], also returning the cumulative distance at each
    /// joint (vertex), i.e. the total distance traveled up to and including
    /// that vertex.
    pub fn route_distance_with_joints(route: &[Vector2<f64>]) -> (f64, Vec<f64>) {
        #[cfg(feature = "profiling")]
        profiling::scope!("route::route_distance_with_joints");
        let mut joints = Vec::with_capacity(route.len().saturating_sub(1));
        let mut acc = 0.0;
        for w in route.windows(2) {
            acc += (w[1] - w[0]).norm();
            joints.push(acc);
        }
        let total = joints.last().copied().unwrap_or(0.0);
        (total, joints)
    }

    /// Samples `n` (or, when `n == 0`, `step`-spaced) points equally spaced
    /// by arc length along a continuous polyline.
    ///
    /// When `n == 0`, offsets are `[0, step, 2*step, ...)` strictly less than
    /// the total route length. When `n > 0`, `n` evenly spaced samples are
    /// taken including both endpoints and `step` is recomputed as
    /// `total / (n - 1)`.
    pub fn interpolate_along_route(route: &[Vector2<f64>], step: f64, n: usize) -> RouteSamples {
        #[cfg(feature = "profiling")]
        profiling::scope!("route::interpolate_along_route");
        let (total_dist, joints_dist) = route_distance_with_joints(route);

        let (offsets, realized_step, realized_n) = if n == 0 {
            let mut offsets = Vec::new();
            let mut t = 0.0;
            while t < total_dist {
                offsets.push(t);
                t += step;
            }
            let realized_n = offsets.len();
            (offsets, step, realized_n)
        } else {
            let realized_step = total_dist / (n as f64 - 1.0);
            let offsets: Vec<f64> = (0..n).map(|i| total_dist * i as f64 / (n as f64 - 1.0)).collect();
            (offsets, realized_step, n)
        };

        let line_starts: Vec<Vector2<f64>> = route[..route.len() - 1].to_vec();
        let line_ends: Vec<Vector2<f64>> = route[1..].to_vec();
        let unit_vectors: Vec<Vector2<f64>> = line_starts
            .iter()
            .zip(&line_ends)
            .map(|(&a, &b)| {
                let d = b - a;
                let norm = d.norm();
                if norm > 0.0 { d / norm } else { Vector2::zeros() }
            })
            .collect();

        let points = offsets
            .iter()
            .map(|&offset| {
                let segment = digitize_right_inclusive(&joints_dist, offset);
                let prev_joint = if segment == 0 { 0.0 } else { joints_dist[segment - 1] };
                let relative_offset = offset - prev_joint;
                line_starts[segment] + unit_vectors[segment] * relative_offset
            })
            .collect();

        RouteSamples { points, step: realized_step, n: realized_n }
    }
}

pub use imp::{interpolate_along_route, route_distance, route_distance_with_joints};

/// `np.digitize(value, bins, right=True)`: the count of bin edges strictly
/// less than `value`, clamped into the valid segment range. Floating-point
/// offsets landing fractionally past the last joint (e.g. the final sample
/// of an `n`-point linspace) still resolve to the last segment.
fn digitize_right_inclusive(bins: &[f64], value: f64) -> usize {
    let idx = bins.iter().position(|&b| value <= b).unwrap_or(bins.len());
    idx.min(bins.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f64, y: f64) -> Vector2<f64> {
        Vector2::new(x, y)
    }

    #[test]
    fn route_distance_sums_segments() {
        let route = vec![v(0.0, 0.0), v(3.0, 4.0), v(3.0, 0.0)];
        assert!((route_distance(&route) - 9.0).abs() < 1e-9);
    }

    #[test]
    fn interpolate_along_route_scenario_s5() {
        let route = vec![v(0.0, 0.0), v(10.0, 0.0), v(10.0, 10.0)];
        let samples = interpolate_along_route(&route, 1e-3, 5);
        let expected = vec![v(0.0, 0.0), v(5.0, 0.0), v(10.0, 0.0), v(10.0, 5.0), v(10.0, 10.0)];
        assert_eq!(samples.points.len(), expected.len());
        for (got, want) in samples.points.iter().zip(&expected) {
            assert!((got - want).norm() < 1e-9, "got {:?} want {:?}", got, want);
        }
    }

    #[test]
    fn interpolate_step_mode_excludes_total_length() {
        let route = vec![v(0.0, 0.0), v(1.0, 0.0)];
        let samples = interpolate_along_route(&route, 0.25, 0);
        assert!(samples.points.iter().all(|p| p.x < 1.0));
        assert_eq!(samples.points.len(), 4);
    }

    #[test]
    fn route_distance_round_trip_invariant_8() {
        let route = vec![v(0.0, 0.0), v(4.0, 0.0), v(4.0, 3.0)];
        let total = route_distance(&route);
        for k in [2usize, 5, 20] {
            let samples = interpolate_along_route(&route, 1e-3, k);
            let resampled_total = route_distance(&samples.points);
            assert!((resampled_total - total).abs() < total / (k as f64) + 1e-6);
        }
    }
}
