//! # World Persistence Integration Test
//!
//! Base and diff streams end to end: layout of a minimal diff, base round
//! trips, diff reapplication and template priority.

use meridian::core::{BinaryReader, BinaryWriter, Component, EntityTemplate, HEntity};
use meridian::shared::{Data, Params, ResourceManager, StrId};
use meridian::{GameWorld, WorldState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

impl Component for Position {
    const NAME: &'static str = "Position";
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Health {
    current: i32,
    max: i32,
}

impl Component for Health {
    const NAME: &'static str = "Health";
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Tag {
    label: String,
}

impl Component for Tag {
    const NAME: &'static str = "Tag";
}

fn world_with(resources: &Arc<ResourceManager>) -> GameWorld {
    let mut world = GameWorld::new(Arc::clone(resources));
    world.register_component::<Position>();
    world.register_component::<Health>();
    world.register_component::<Tag>();
    world
}

fn world() -> GameWorld {
    world_with(&Arc::new(ResourceManager::new()))
}

fn save_all(world: &GameWorld) -> Vec<u8> {
    let mut w = BinaryWriter::new();
    assert!(world.save_all(&mut w).unwrap());
    w.into_inner()
}

fn save_diff(world: &GameWorld) -> Vec<u8> {
    let mut w = BinaryWriter::new();
    assert!(world.save_diff(&mut w).unwrap());
    w.into_inner()
}

/// Test: A single new entity with one component produces exactly one
/// entity record and one section with one entry, and reloads intact.
#[test]
fn test_single_entity_diff_layout() {
    let mut world = GameWorld::new(Arc::new(ResourceManager::new()));
    world.register_component::<Position>();
    let e1 = world.create_entity(StrId::EMPTY, StrId::EMPTY);
    world.add_component(e1, Position { x: 1.0, y: 2.0, z: 3.0 });

    let diff = save_diff(&world);
    let mut r = BinaryReader::new(&diff);

    // No deleted entities
    assert_eq!(r.read_u64().unwrap(), 0);
    // One entity record, unchanged against the default record
    assert_eq!(r.read_u64().unwrap(), e1.raw());
    assert_eq!(r.read_u8().unwrap(), 0);
    assert_eq!(r.read_u64().unwrap(), 0);

    // One component section
    assert_eq!(r.read_u32().unwrap(), 1);
    assert_eq!(r.read_str_id().unwrap(), StrId::new("Position"));
    let section = r.read_blob().unwrap();
    assert_eq!(r.remaining(), 0);

    let mut s = BinaryReader::new(section);
    assert_eq!(s.read_u64().unwrap(), 0);
    assert_eq!(s.read_u64().unwrap(), e1.raw());
    s.read_blob().unwrap();
    assert_eq!(s.read_u64().unwrap(), 0);
    assert_eq!(s.remaining(), 0);

    let mut fresh = GameWorld::new(Arc::new(ResourceManager::new()));
    fresh.register_component::<Position>();
    fresh.load_diff(&diff).unwrap();
    assert_eq!(fresh.state(), WorldState::Stopped);
    assert_eq!(fresh.entity_count(), 1);
    assert_eq!(
        fresh.find_component::<Position>(e1),
        Some(&Position { x: 1.0, y: 2.0, z: 3.0 })
    );
}

/// Test: Saving the whole world and loading it as base reproduces every
/// record and component at the same handles.
#[test]
fn test_base_round_trip() {
    let mut source = world();
    let mut handles = Vec::new();
    for i in 0..40u8 {
        let level = if i % 2 == 0 { "North" } else { "South" };
        let e = source.create_entity(StrId::new(level), StrId::EMPTY);
        let f = f32::from(i);
        source.add_component(e, Position { x: f, y: 0.0, z: -f });
        if i % 3 == 0 {
            source.add_component(e, Health { current: i32::from(i), max: 100 });
        }
        if i % 5 == 0 {
            source.add_component(e, Tag { label: format!("unit-{i}") });
            source.set_entity_active(e, false);
        }
        handles.push(e);
    }
    // Leave holes behind so handles aren't simply 0..n
    for e in handles.iter().skip(1).step_by(4) {
        source.delete_entity(*e);
    }

    let mut world = world();
    world.load_base(save_all(&source)).unwrap();
    world.start();

    assert_eq!(world.entity_count(), source.entity_count());
    for e in &handles {
        assert_eq!(world.entity_exists(*e), source.entity_exists(*e));
        assert_eq!(world.get_entity(*e), source.get_entity(*e));
        assert_eq!(world.find_component::<Position>(*e), source.find_component::<Position>(*e));
        assert_eq!(world.find_component::<Health>(*e), source.find_component::<Health>(*e));
        assert_eq!(world.find_component::<Tag>(*e), source.find_component::<Tag>(*e));
    }

    // Nothing changed yet
    assert_eq!(world.save_diff_params().unwrap(), Params::new());
}

/// Test: base + diff reproduces the mutated world, and saving the diff
/// again describes the same changes.
#[test]
fn test_diff_reapplies() {
    let mut source = world();
    let kept = source.create_entity(StrId::new("L"), StrId::EMPTY);
    let moved = source.create_entity(StrId::new("L"), StrId::EMPTY);
    let doomed = source.create_entity(StrId::new("L"), StrId::EMPTY);
    for e in [kept, moved, doomed] {
        source.add_component(e, Position::default());
        source.add_component(e, Health { current: 10, max: 10 });
    }
    let base = save_all(&source);

    let mut live = world();
    live.load_base(base.as_slice()).unwrap();
    live.start();

    live.find_component_mut::<Position>(moved).unwrap().x = 8.5;
    live.remove_component::<Health>(moved);
    live.delete_entity(doomed);
    live.set_entity_active(kept, false);
    let spawned = live.create_entity(StrId::new("M"), StrId::EMPTY);
    live.add_component(spawned, Tag { label: "new".to_owned() });
    live.stop();

    let diff = save_diff(&live);

    let mut reloaded = world();
    reloaded.load_base(base.as_slice()).unwrap();
    reloaded.load_diff(&diff).unwrap();

    assert!(!reloaded.entity_exists(doomed));
    assert!(!reloaded.is_entity_active(kept));
    assert_eq!(reloaded.find_component::<Position>(moved).unwrap().x, 8.5);
    assert!(reloaded.find_component::<Health>(moved).is_none());
    assert_eq!(reloaded.find_component::<Health>(kept), Some(&Health { current: 10, max: 10 }));
    assert_eq!(reloaded.get_entity_level(spawned), StrId::new("M"));
    assert_eq!(reloaded.find_component::<Tag>(spawned).unwrap().label, "new");
    assert_eq!(reloaded.component_count::<Health>(), 1);

    assert_eq!(reloaded.save_diff_params(), live.save_diff_params());

    // A second diff from the reloaded world applies the same way
    let mut again = world();
    again.load_base(base.as_slice()).unwrap();
    again.load_diff(&save_diff(&reloaded)).unwrap();
    assert_eq!(again.save_diff_params(), live.save_diff_params());
}

/// Test: An empty diff restores plain base, even after earlier changes.
#[test]
fn test_clear_diff_restores_base() {
    let mut source = world();
    let e = source.create_entity(StrId::EMPTY, StrId::EMPTY);
    source.add_component(e, Health { current: 3, max: 3 });

    let mut world = world();
    world.load_base(save_all(&source)).unwrap();
    world.start();
    world.find_component_mut::<Health>(e).unwrap().current = 0;
    world.delete_entity(e);

    world.clear_diff();
    assert_eq!(world.state(), WorldState::BaseLoaded);
    world.start();
    assert_eq!(world.find_component::<Health>(e), Some(&Health { current: 3, max: 3 }));
}

/// Test: Stored component data wins over template data, and purely
/// templated components come back without being stored.
#[test]
fn test_template_priority() {
    let resources = Arc::new(ResourceManager::new());
    resources.insert(
        StrId::new("tpl/guard"),
        EntityTemplate::new(
            Params::from_json_str(
                r#"{"Health": {"current": 100, "max": 100}, "Tag": {"label": "guard"}}"#,
            )
            .unwrap(),
        ),
    );

    let mut source = world_with(&resources);
    let veteran = source.create_entity(StrId::EMPTY, StrId::new("tpl/guard"));
    source.find_component_mut::<Health>(veteran).unwrap().current = 40;
    let rookie = source.create_entity(StrId::EMPTY, StrId::new("tpl/guard"));

    let mut world = world_with(&resources);
    world.load_base(save_all(&source)).unwrap();
    world.start();

    assert_eq!(world.find_component::<Health>(veteran), Some(&Health { current: 40, max: 100 }));
    assert_eq!(world.find_component::<Health>(rookie), Some(&Health { current: 100, max: 100 }));
    assert_eq!(world.find_component::<Tag>(rookie).unwrap().label, "guard");

    // Removing a templated component shows up in the diff as a removal
    world.remove_component::<Tag>(rookie);
    let diff = world.save_diff_params().unwrap();
    let rookie_desc = diff
        .get(StrId::new(&rookie.to_key()))
        .and_then(Data::as_params)
        .unwrap();
    assert!(rookie_desc.get(StrId::new("Tag")).unwrap().is_void());
    assert!(diff.get(StrId::new(&veteran.to_key())).is_none());
}

/// Test: A templated component removed at runtime stays removed after the
/// diff is applied over the base, in both binary and params form.
#[test]
fn test_templated_removal_survives_diff() {
    let resources = Arc::new(ResourceManager::new());
    resources.insert(
        StrId::new("tpl/guard"),
        EntityTemplate::new(
            Params::from_json_str(
                r#"{"Health": {"current": 100, "max": 100}, "Tag": {"label": "guard"}}"#,
            )
            .unwrap(),
        ),
    );

    let mut source = world_with(&resources);
    let guard = source.create_entity(StrId::EMPTY, StrId::new("tpl/guard"));
    let base = save_all(&source);

    let mut live = world_with(&resources);
    live.load_base(base.as_slice()).unwrap();
    live.start();
    assert!(live.remove_component::<Tag>(guard));
    // A recruit has no base entry to compare against
    let recruit = live.create_entity(StrId::EMPTY, StrId::new("tpl/guard"));
    assert!(live.remove_component::<Tag>(recruit));
    live.stop();

    let diff = save_diff(&live);
    let mut reloaded = world_with(&resources);
    reloaded.load_base(base.as_slice()).unwrap();
    reloaded.load_diff(&diff).unwrap();
    for e in [guard, recruit] {
        assert!(reloaded.find_component::<Tag>(e).is_none());
        assert_eq!(reloaded.find_component::<Health>(e), Some(&Health { current: 100, max: 100 }));
    }
    assert_eq!(reloaded.save_diff_params(), live.save_diff_params());

    let params_diff = live.save_diff_params().unwrap();
    let mut from_params = world_with(&resources);
    from_params.load_base(base.as_slice()).unwrap();
    from_params.load_diff_params(&params_diff);
    for e in [guard, recruit] {
        assert!(from_params.find_component::<Tag>(e).is_none());
        assert!(from_params.find_component::<Health>(e).is_some());
    }
    assert_eq!(from_params.save_diff_params(), Some(params_diff));
}

/// Test: A diff naming an entity that collides with another is rejected
/// and leaves the world empty.
#[test]
fn test_corrupt_diff_rejected() {
    let mut w = BinaryWriter::new();
    w.write_u64(0);
    let e = HEntity::new(3, 1);
    for _ in 0..2 {
        w.write_u64(e.raw());
        w.write_u8(0);
    }
    w.write_u64(0);
    w.write_u32(0);

    let mut world = world();
    assert!(world.load_diff(w.as_slice()).is_err());
    assert_eq!(world.entity_count(), 0);
    assert_eq!(world.state(), WorldState::Stopped);
}

/// Test: Params saves round trip through a fresh world.
#[test]
fn test_params_world_round_trip() {
    let mut source = world();
    let a = source.create_entity(StrId::new("Keep"), StrId::EMPTY);
    source.add_component(a, Position { x: 4.0, y: 5.0, z: 6.0 });
    source.add_component(a, Tag { label: "gate".to_owned() });
    let b = source.create_entity(StrId::EMPTY, StrId::EMPTY);
    source.set_entity_active(b, false);

    let json = source.save_all_params().unwrap().to_json_string().unwrap();
    let params = Params::from_json_str(&json).unwrap();

    let mut world = world();
    world.load_base_params(&params);
    assert_eq!(world.get_entity(a), source.get_entity(a));
    assert_eq!(world.get_entity(b), source.get_entity(b));
    assert_eq!(world.find_component::<Position>(a), Some(&Position { x: 4.0, y: 5.0, z: 6.0 }));
    assert_eq!(world.find_component::<Tag>(a).unwrap().label, "gate");
}
