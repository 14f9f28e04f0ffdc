//! Performance benchmarks for larp-field
//!
//! Run with: cargo bench --package larp-field

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use larp_field::{Config, HotLoader, NullGraph, Primitive, PotentialField, Quadtree};
use nalgebra::{Matrix2, Vector2};

/// Scatters `n` point primitives across a square of the given half-extent,
/// each with an isotropic repulsion matrix.
fn generate_field(n: usize, half_extent: f64) -> PotentialField {
    let repulsion = 5.0 * Matrix2::identity();
    let primitives: Vec<Primitive> = (0..n)
        .map(|i| {
            let t = i as f64 / n as f64;
            let x = -half_extent + t * 2.0 * half_extent + (t * 37.0).sin() * 0.5;
            let y = -half_extent + t * 2.0 * half_extent + (t * 23.0).cos() * 0.5;
            Primitive::point(Vector2::new(x, y), Some(repulsion)).unwrap()
        })
        .collect();
    PotentialField::with_primitives(primitives, Some(Vector2::new(0.0, 0.0)), Some(Vector2::new(2.0 * half_extent, 2.0 * half_extent)))
}

fn bench_field_eval(c: &mut Criterion) {
    let mut group = c.benchmark_group("field_eval");

    for &n in &[16usize, 256, 4096] {
        let field = generate_field(n, 500.0);
        let points: Vec<Vector2<f64>> = (0..1000).map(|i| Vector2::new(i as f64 * 0.5 - 250.0, i as f64 * 0.3 - 150.0)).collect();

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("eval_1k_points", n), &n, |b, _| {
            b.iter(|| field.eval(&points, None));
        });
    }

    group.finish();
}

fn bench_quadtree_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("quadtree_build");
    group.sample_size(20);

    for &n in &[16usize, 256, 4096] {
        let field = generate_field(n, 500.0);

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("build", n), &n, |b, _| {
            b.iter(|| Quadtree::built(&field, Config::default()));
        });
    }

    group.finish();
}

fn bench_find_quads(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_quads");

    let field = generate_field(4096, 500.0);
    let tree = Quadtree::built(&field, Config::default());
    let points: Vec<Vector2<f64>> = (0..1000).map(|i| Vector2::new(i as f64 * 0.5 - 250.0, i as f64 * 0.3 - 150.0)).collect();

    group.throughput(Throughput::Elements(points.len() as u64));
    group.bench_function("1k_points_over_4096_primitives", |b| {
        b.iter(|| tree.find_quads(&points));
    });

    group.finish();
}

fn bench_hotload(c: &mut Criterion) {
    let mut group = c.benchmark_group("hotload");
    group.sample_size(20);

    group.bench_function("add_then_remove_single_rgj", |b| {
        b.iter_batched(
            || {
                let field = generate_field(512, 500.0);
                let tree = Quadtree::built(&field, Config::default());
                (field, tree)
            },
            |(mut field, mut tree)| {
                let mut loader = HotLoader::new(&mut field, &mut tree, NullGraph);
                let idx = loader.add_rgj(Primitive::point(Vector2::new(0.0, 0.0), Some(10.0 * Matrix2::identity())).unwrap());
                loader.remove_rgj(vec![idx]);
            },
            criterion::BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_field_eval, bench_quadtree_build, bench_find_quads, bench_hotload);

criterion_main!(benches);
