//! # MERIDIAN
//!
//! The game world, tying every engine layer together.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          MERIDIAN WORLD                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌────────────────────┐          ┌────────────────────────────┐  │
//! │  │   GameWorld        │  owns    │   GameLevel (per id)       │  │
//! │  │                    │─────────>│                            │  │
//! │  │  • entities        │          │  • scene root              │  │
//! │  │  • base snapshot   │          │  • physics sub-level       │  │
//! │  │  • storages        │          │  • SPS quadtree            │  │
//! │  │  • templates       │          │  • navigation maps         │  │
//! │  └─────────┬──────────┘          └─────────────┬──────────────┘  │
//! │            │                                   │                 │
//! │            v                                   v                 │
//! │  ┌────────────────────┐          ┌────────────────────────────┐  │
//! │  │   meridian_core    │          │   meridian_spatial         │  │
//! │  │  handles, stores,  │          │  Morton codes, arena,      │  │
//! │  │  binary streams    │          │  frustum visibility        │  │
//! │  └────────────────────┘          └────────────────────────────┘  │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `world`: `GameWorld`, its persistence formats and join queries
//! - `config`: TOML configuration
//! - `error`: `WorldError`
//!
//! ## Example
//!
//! ```rust,ignore
//! use meridian::{GameWorld, MeridianConfig};
//!
//! let config = MeridianConfig::from_file("meridian.toml")?;
//! let mut world = GameWorld::with_config(resources, &config);
//! world.register_component::<Position>();
//! world.load_base(std::fs::read("world.base")?)?;
//! world.load_diff(&std::fs::read("save_03.diff")?)?;
//! world.start();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod world;

// Re-export the layers
pub use meridian_core as core;
pub use meridian_level as level;
pub use meridian_shared as shared;
pub use meridian_spatial as spatial;

// Re-export commonly used types
pub use config::{MeridianConfig, WorldConfig, DEFAULT_ENTITY_CAPACITY};
pub use error::{WorldError, WorldResult};
pub use world::{GameWorld, Join, StorageRegistry, WorldState};
