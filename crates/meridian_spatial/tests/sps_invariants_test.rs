//! # SPS Invariant Tests
//!
//! Random add/move/remove churn checked against brute-force recounts, and
//! frustum queries checked against per-object clipping.

use meridian_shared::{Aabb, Vec3};
use meridian_spatial::morton::{self, Morton};
use meridian_spatial::{Frustum, Plane, RecordId, Sps, VisibilityCache, NO_NODE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

const WORLD_SIZE: f32 = 512.0;

fn random_box(rng: &mut StdRng) -> Aabb {
    let half = WORLD_SIZE * 0.5;
    let center = Vec3::new(
        rng.gen_range(-half * 1.1..half * 1.1),
        rng.gen_range(-10.0..10.0),
        rng.gen_range(-half * 1.1..half * 1.1),
    );
    // Mostly small objects with the occasional large one
    let size = if rng.gen_bool(0.1) {
        rng.gen_range(20.0..200.0)
    } else {
        rng.gen_range(0.1..4.0)
    };
    Aabb::from_center_extent(center, Vec3::new(size, size * 0.5, size))
}

fn window(min_x: f32, max_x: f32, min_z: f32, max_z: f32) -> Frustum {
    Frustum::from_planes([
        Plane::new(1.0, 0.0, 0.0, -min_x),
        Plane::new(-1.0, 0.0, 0.0, max_x),
        Plane::new(0.0, 0.0, 1.0, -min_z),
        Plane::new(0.0, 0.0, -1.0, max_z),
        Plane::new(0.0, 1.0, 0.0, 1000.0),
        Plane::new(0.0, -1.0, 0.0, 1000.0),
    ])
}

/// Recounts every node from the records and compares with the tree.
fn assert_counts_consistent(sps: &Sps) {
    for (index, node) in sps.nodes() {
        let mut expected = sps
            .records()
            .filter(|(_, r)| morton::is_ancestor_or_self(node.morton, r.node_morton))
            .count();
        if node.parent == NO_NODE {
            expected += 1;
        } else {
            let parent = sps.node(node.parent).expect("parent must exist");
            assert_eq!(parent.morton, morton::parent(node.morton));
            assert!(node.parent < index, "parent after child");
        }

        assert_eq!(
            node.subtree_object_count as usize, expected,
            "node {:#x} count mismatch",
            node.morton
        );
        assert!(node.subtree_object_count > 0, "empty node survived");
        assert_eq!(sps.node_index(node.morton), Some(index));
    }

    for (_, record) in sps.records() {
        if record.node_index != NO_NODE {
            assert_eq!(sps.node(record.node_index).map(|n| n.morton), Some(record.node_morton));
        }
    }
}

/// Test: Node counts always match a brute-force recount.
#[test]
fn test_counts_survive_random_churn() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut sps = Sps::new(Vec3::ZERO, WORLD_SIZE, 7);
    let mut live: Vec<RecordId> = Vec::new();

    for step in 0..3_000u64 {
        match rng.gen_range(0..10) {
            0..=3 => live.push(sps.add_record(random_box(&mut rng), step)),
            4..=6 if !live.is_empty() => {
                let id = live[rng.gen_range(0..live.len())];
                assert!(sps.update_record(id, random_box(&mut rng)));
            }
            7..=9 if !live.is_empty() => {
                let id = live.swap_remove(rng.gen_range(0..live.len()));
                assert!(sps.remove_record(id).is_some());
            }
            _ => {}
        }

        if step % 250 == 0 {
            assert_counts_consistent(&sps);
        }
    }
    assert_counts_consistent(&sps);

    for id in live {
        sps.remove_record(id);
    }
    assert_eq!(sps.node_count(), 1, "only the root should remain");
}

fn brute_force_lca(a: Morton, b: Morton) -> Morton {
    let mut ancestors = HashSet::new();
    let mut curr = a;
    while curr != 0 {
        ancestors.insert(curr);
        curr = morton::parent(curr);
    }
    let mut curr = b;
    while curr != 0 && !ancestors.contains(&curr) {
        curr = morton::parent(curr);
    }
    curr
}

/// Test: LCA matches a walk up both chains for every pair up to depth 3.
#[test]
fn test_lca_matches_brute_force() {
    let mut codes = Vec::new();
    for depth in 0..=3u32 {
        let side = 1u16 << depth;
        for x in 0..side {
            for z in 0..side {
                codes.push(morton::from_cell(depth, x, z));
            }
        }
    }

    for &a in &codes {
        for &b in &codes {
            assert_eq!(morton::lca(a, b), brute_force_lca(a, b), "lca({a:#x}, {b:#x})");
        }
    }
}

/// Test: Node-level culling never changes the answer of per-object clipping.
#[test]
fn test_query_matches_per_object_clipping() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut sps = Sps::new(Vec3::ZERO, WORLD_SIZE, 6);
    for i in 0..1_500u64 {
        sps.add_record(random_box(&mut rng), i);
    }

    let mut cache = VisibilityCache::new();
    let mut out = Vec::new();
    for _ in 0..40 {
        let x = rng.gen_range(-300.0..250.0);
        let z = rng.gen_range(-300.0..250.0);
        let frustum = window(x, x + rng.gen_range(5.0..200.0), z, z + rng.gen_range(5.0..200.0));

        out.clear();
        let stats = sps.query_visible(&frustum, &mut cache, &mut out);
        let mut got: Vec<u64> = out.clone();
        got.sort_unstable();

        let mut expected: Vec<u64> = sps
            .records()
            .filter(|(_, r)| r.bounds_version != 0)
            .filter(|(_, r)| {
                frustum
                    .clip_box(r.aabb.center(), r.aabb.extent(), false)
                    .is_visible()
            })
            .map(|(_, r)| r.user_data)
            .collect();
        expected.sort_unstable();

        assert_eq!(got, expected);
        assert_eq!(stats.visible, got.len());
        assert!(stats.objects_tested <= sps.record_count());
    }
}

/// Test: Cached classification equals a fresh one after tree changes.
#[test]
fn test_cache_matches_fresh_pass() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut sps = Sps::new(Vec3::ZERO, WORLD_SIZE, 6);
    let frustum = window(-100.0, 60.0, -80.0, 120.0);
    let mut cache = VisibilityCache::new();
    let mut ids = Vec::new();

    for round in 0..20u64 {
        for i in 0..50 {
            ids.push(sps.add_record(random_box(&mut rng), round * 100 + i));
        }
        for _ in 0..20 {
            let id = ids.swap_remove(rng.gen_range(0..ids.len()));
            sps.remove_record(id);
        }

        sps.test_visibility(&frustum, &mut cache);
        let mut fresh = VisibilityCache::new();
        sps.test_visibility(&frustum, &mut fresh);

        for (index, _) in sps.nodes() {
            assert_eq!(cache.status(index), fresh.status(index), "node {index}");
        }
    }
}
