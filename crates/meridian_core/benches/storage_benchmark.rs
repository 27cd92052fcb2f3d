//! # Storage Performance Benchmark
//!
//! Handle allocation churn, typed component lookup and diff encoding.
//!
//! Run with: `cargo bench --package meridian_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meridian_core::{
    BinaryWriter, Component, ComponentStorage, ComponentStore, Entity, EntityStorage, HEntity,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

impl Component for Position {
    const NAME: &'static str = "Position";
}

#[allow(clippy::cast_precision_loss)]
fn populated(count: usize) -> (EntityStorage, ComponentStore<Position>) {
    let mut entities = EntityStorage::with_capacity(count);
    let mut positions = ComponentStore::new(true);
    for i in 0..count {
        let e = entities.allocate(Entity::default());
        let f = i as f32;
        positions.add(e, Position { x: f, y: f, z: f });
    }
    (entities, positions)
}

fn bench_allocate_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate_free");

    for count in [1_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut entities = EntityStorage::with_capacity(count);
                let handles: Vec<HEntity> =
                    (0..count).map(|_| entities.allocate(Entity::default())).collect();
                for h in handles.iter().step_by(2) {
                    entities.free(*h);
                }
                for _ in 0..count / 2 {
                    black_box(entities.allocate(Entity::default()));
                }
                entities.len()
            });
        });
    }

    group.finish();
}

fn bench_typed_lookup(c: &mut Criterion) {
    let (entities, positions) = populated(100_000);
    let handles: Vec<HEntity> = entities.iter().map(|(h, _)| h).collect();

    c.bench_function("find_component_100k", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for h in &handles {
                if let Some(p) = positions.find(*h) {
                    sum += p.x;
                }
            }
            black_box(sum)
        });
    });
}

fn bench_save_all(c: &mut Criterion) {
    let (_, positions) = populated(100_000);

    c.bench_function("save_all_100k", |b| {
        let mut w = BinaryWriter::with_capacity(2 << 20);
        b.iter(|| {
            w.reset();
            positions.save_all(&mut w).ok();
            black_box(w.len())
        });
    });
}

criterion_group!(benches, bench_allocate_free, bench_typed_lookup, bench_save_all);
criterion_main!(benches);
