//! # World Inspector
//!
//! Headless tool that loads a world file, optionally a diff and a level
//! description, and prints what it finds.
//!
//! Without arguments it runs the demo path instead:
//! 1. Build a level and a few thousand entities
//! 2. Save the base, mutate, save the diff
//! 3. Reload base + diff into a fresh world
//! 4. Compare and report timings

use meridian::core::{BinaryReader, BinaryWriter, Component, Entity};
use meridian::level::LevelDesc;
use meridian::shared::{Aabb, ResourceManager, StrId, Vec3};
use meridian::{GameWorld, MeridianConfig, WorldState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

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
struct Velocity {
    x: f32,
    z: f32,
}

impl Component for Velocity {
    const NAME: &'static str = "Velocity";
}

fn main() {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         MERIDIAN WORLD INSPECTOR                                 ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let args: Vec<String> = std::env::args().collect();
    let option = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    if args.iter().any(|a| a == "--help") {
        print_usage();
        return;
    }

    let config = match option("--config") {
        Some(path) => match MeridianConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                println!("Error: Could not load config {path}: {e}");
                std::process::exit(1);
            }
        },
        None => MeridianConfig::default(),
    };

    let world_path = args.get(1).filter(|a| !a.starts_with("--")).cloned();
    let ok = match world_path {
        Some(path) => inspect(&path, option("--diff"), option("--level"), &config, &args),
        None => run_demo(&config),
    };

    std::process::exit(i32::from(!ok));
}

fn print_usage() {
    println!("Usage: meridian_inspect [world.base] [options]");
    println!();
    println!("Options:");
    println!("  --diff <file>     Apply a binary diff over the base");
    println!("  --level <file>    Load a TOML level description first");
    println!("  --config <file>   World and SPS configuration");
    println!("  --json            Dump the entity records as params JSON");
    println!();
    println!("Without a world file, runs the save/load demo.");
}

// =============================================================================
// INSPECT
// =============================================================================

fn inspect(
    path: &str,
    diff_path: Option<String>,
    level_path: Option<String>,
    config: &MeridianConfig,
    args: &[String],
) -> bool {
    let resources = Arc::new(ResourceManager::new());
    let mut world = GameWorld::with_config(resources, config);

    if let Some(level_path) = level_path {
        let desc = match LevelDesc::from_file(&level_path) {
            Ok(desc) => desc,
            Err(e) => {
                println!("Error: Could not load level {level_path}: {e}");
                return false;
            }
        };
        let id = StrId::new(
            std::path::Path::new(&level_path)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("level"),
        );
        if world.load_level(id, &desc).is_none() {
            println!("Error: Level {id} could not be created");
            return false;
        }
        let validated = world.validate_level(id);
        println!("Level '{id}' loaded, {validated} components validated");
    }

    println!("Loading world: {path}");
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            println!("Error: Could not open file: {e}");
            return false;
        }
    };

    print_sections(&bytes);

    let start = Instant::now();
    if let Err(e) = world.load_base(bytes) {
        println!("Error: Could not load world: {e}");
        return false;
    }
    println!("Base loaded in {:?}", start.elapsed());

    if let Some(diff_path) = diff_path {
        let diff = match std::fs::read(&diff_path) {
            Ok(diff) => diff,
            Err(e) => {
                println!("Error: Could not open diff: {e}");
                return false;
            }
        };
        let start = Instant::now();
        if let Err(e) = world.load_diff(&diff) {
            println!("Error: Could not apply diff: {e}");
            return false;
        }
        println!("Diff applied in {:?}", start.elapsed());
    }

    world.finalize_loading();
    print_world(&world);

    if args.iter().any(|a| a == "--json") {
        match world.save_all_params().map(|p| p.to_json_string()) {
            Some(Ok(json)) => println!("{json}"),
            Some(Err(e)) => println!("Error: Could not encode params: {e}"),
            None => println!("Error: World has no actual state"),
        }
    }
    true
}

/// Walks the base layout to list component sections without decoding them.
fn print_sections(bytes: &[u8]) {
    let mut r = BinaryReader::new(bytes);
    let walk = |r: &mut BinaryReader<'_>| -> meridian::core::CoreResult<Vec<(StrId, u32)>> {
        let count = r.read_u32()?;
        for _ in 0..count {
            r.read_u64()?;
            Entity::read(r)?;
        }
        let sections = r.read_u32()?;
        let mut out = Vec::new();
        for _ in 0..sections {
            let name = r.read_str_id()?;
            let len = r.read_u32()?;
            r.skip(len as usize)?;
            out.push((name, len));
        }
        Ok(out)
    };

    println!();
    println!("┌─ COMPONENT SECTIONS ─────────────────────────────────────────────┐");
    match walk(&mut r) {
        Ok(sections) => {
            for (name, len) in sections {
                println!("│ {name:<32} {len:>10} bytes");
            }
        }
        Err(e) => println!("│ unreadable: {e}"),
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
}

fn print_world(world: &GameWorld) {
    let mut per_level: BTreeMap<StrId, usize> = BTreeMap::new();
    let mut inactive = 0;
    let mut templated = 0;
    for (_, record) in world.entities().iter() {
        *per_level.entry(record.level_id).or_default() += 1;
        inactive += usize::from(!record.is_active);
        templated += usize::from(!record.template_id.is_empty());
    }

    println!();
    println!("┌─ WORLD ──────────────────────────────────────────────────────────┐");
    println!("│ State:              {:?}", world.state());
    println!("│ Entities:           {}", world.entity_count());
    println!("│ Base entities:      {}", world.base_entities().len());
    println!("│ Inactive:           {inactive}");
    println!("│ Templated:          {templated}");
    for (level, count) in &per_level {
        let name = if level.is_empty() { "<global>" } else { level.as_str() };
        println!("│   {name:<24} {count:>8}");
    }
    for level in world.levels() {
        println!(
            "│ Level {:<16} {} SPS nodes, {} records",
            level.id(),
            level.sps().node_count(),
            level.sps().record_count()
        );
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
}

// =============================================================================
// DEMO
// =============================================================================

#[allow(clippy::cast_precision_loss)]
fn run_demo(config: &MeridianConfig) -> bool {
    const ENTITIES: usize = 5_000;
    let resources = Arc::new(ResourceManager::new());
    let level_id = StrId::new("Demo");

    let new_world = || {
        let mut world = GameWorld::with_config(Arc::clone(&resources), config);
        world.register_component::<Position>();
        world.register_component::<Velocity>();
        world
    };

    // === BUILD ===
    let start = Instant::now();
    let mut source = new_world();
    let bounds = Aabb::from_center_extent(Vec3::ZERO, Vec3::new(256.0, 64.0, 256.0));
    if source.create_level(level_id, bounds, None, 0).is_none() {
        println!("✗ Could not create the demo level");
        return false;
    }

    let mut handles = Vec::with_capacity(ENTITIES);
    for i in 0..ENTITIES {
        let e = source.create_entity(level_id, StrId::EMPTY);
        let f = (i % 500) as f32 - 250.0;
        source.add_component(e, Position { x: f, y: 0.0, z: -f });
        if i % 3 == 0 {
            source.add_component(e, Velocity { x: 1.0, z: 0.5 });
        }
        if let Some(level) = source.find_level_mut(level_id) {
            let aabb = Aabb::from_center_extent(Vec3::new(f, 0.0, -f), Vec3::splat(1.0));
            level.sps_mut().add_record(aabb, e.raw());
        }
        handles.push(e);
    }
    println!("Built {ENTITIES} entities in {:?}", start.elapsed());

    let mut base = BinaryWriter::new();
    if let Err(e) = source.save_all(&mut base) {
        println!("✗ Base save failed: {e}");
        return false;
    }
    let base = base.into_inner();
    println!("Base: {} bytes", base.len());

    // === SIMULATE ===
    let mut world = new_world();
    if let Err(e) = world.load_base(base.as_slice()) {
        println!("✗ Base load failed: {e}");
        return false;
    }
    world.start();

    let start = Instant::now();
    for _ in 0..10 {
        world.for_each_entity_with_mut::<Position, &Velocity, _>(|_, _, pos, vel| {
            pos.x += vel.x;
            pos.z += vel.z;
        });
    }
    println!("10 ticks in {:?}", start.elapsed());

    let removed = handles.iter().step_by(7).filter(|e| world.delete_entity(**e)).count();
    world.stop();

    let mut diff = BinaryWriter::new();
    if let Err(e) = world.save_diff(&mut diff) {
        println!("✗ Diff save failed: {e}");
        return false;
    }
    let diff = diff.into_inner();
    println!("Diff: {} bytes, {removed} deletions", diff.len());

    // === RELOAD ===
    let start = Instant::now();
    let mut reloaded = new_world();
    let loaded = reloaded
        .load_base(base.as_slice())
        .and_then(|()| reloaded.load_diff(&diff));
    if let Err(e) = loaded {
        println!("✗ Reload failed: {e}");
        return false;
    }
    println!("Reloaded in {:?}", start.elapsed());

    let mismatches = handles
        .iter()
        .filter(|e| {
            reloaded.entity_exists(**e) != world.entity_exists(**e)
                || reloaded.find_component::<Position>(**e) != world.find_component::<Position>(**e)
        })
        .count();

    print_world(&reloaded);
    println!();
    if mismatches == 0 && reloaded.state() == WorldState::Stopped {
        println!("✓ Reloaded world matches the simulated one");
        true
    } else {
        println!("✗ {mismatches} entities differ after reload");
        false
    }
}
