//! # SPS Performance Benchmark
//!
//! Object insertion, movement and frustum queries over a populated tree.
//!
//! Run with: `cargo bench --package meridian_spatial`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meridian_shared::{Aabb, Vec3};
use meridian_spatial::{Frustum, Plane, RecordId, Sps, VisibilityCache};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WORLD_SIZE: f32 = 4096.0;

fn random_boxes(count: usize, seed: u64) -> Vec<Aabb> {
    let mut rng = StdRng::seed_from_u64(seed);
    let half = WORLD_SIZE * 0.5;
    (0..count)
        .map(|_| {
            let center = Vec3::new(
                rng.gen_range(-half..half),
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-half..half),
            );
            Aabb::from_center_extent(center, Vec3::splat(rng.gen_range(0.5..8.0)))
        })
        .collect()
}

fn populated(boxes: &[Aabb]) -> (Sps, Vec<RecordId>) {
    let mut sps = Sps::new(Vec3::ZERO, WORLD_SIZE, 10);
    let ids = boxes
        .iter()
        .zip(0u64..)
        .map(|(aabb, i)| sps.add_record(*aabb, i))
        .collect();
    (sps, ids)
}

fn view_window(size: f32) -> Frustum {
    Frustum::from_planes([
        Plane::new(1.0, 0.0, 0.0, size),
        Plane::new(-1.0, 0.0, 0.0, size),
        Plane::new(0.0, 0.0, 1.0, size),
        Plane::new(0.0, 0.0, -1.0, size),
        Plane::new(0.0, 1.0, 0.0, 1000.0),
        Plane::new(0.0, -1.0, 0.0, 1000.0),
    ])
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("sps_insert");

    for count in [1_000, 50_000] {
        let boxes = random_boxes(count, 1);
        group.bench_with_input(BenchmarkId::from_parameter(count), &boxes, |b, boxes| {
            b.iter(|| black_box(populated(boxes).0.node_count()));
        });
    }

    group.finish();
}

fn bench_move(c: &mut Criterion) {
    let boxes = random_boxes(20_000, 2);
    let targets = random_boxes(20_000, 3);
    let (mut sps, ids) = populated(&boxes);

    c.bench_function("sps_move_20k", |b| {
        let mut flip = false;
        b.iter(|| {
            let source = if flip { &boxes } else { &targets };
            for (id, aabb) in ids.iter().zip(source) {
                sps.update_record(*id, *aabb);
            }
            flip = !flip;
        });
    });
}

fn bench_query(c: &mut Criterion) {
    let boxes = random_boxes(50_000, 4);
    let (sps, _) = populated(&boxes);
    let frustum = view_window(400.0);

    c.bench_function("sps_query_cold_50k", |b| {
        let mut out = Vec::new();
        b.iter(|| {
            let mut cache = VisibilityCache::new();
            out.clear();
            black_box(sps.query_visible(&frustum, &mut cache, &mut out))
        });
    });

    c.bench_function("sps_query_cached_50k", |b| {
        let mut cache = VisibilityCache::new();
        let mut out = Vec::new();
        b.iter(|| {
            out.clear();
            black_box(sps.query_visible(&frustum, &mut cache, &mut out))
        });
    });
}

criterion_group!(benches, bench_insert, bench_move, bench_query);
criterion_main!(benches);
