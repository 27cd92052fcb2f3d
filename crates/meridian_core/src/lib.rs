//! # MERIDIAN Core
//!
//! Entity/component storage underneath the game world:
//! - Generational entity handles with stale-reference detection
//! - Per-type component storages with a base snapshot and a live overlay
//! - Little-endian binary streams for the base/diff world formats
//!
//! ## Architecture Rules
//!
//! 1. **Typed fast path** - `ComponentStore<T>` lookups are generic, no dynamic dispatch
//! 2. **Erased bulk path** - load/save/clear/validate go through `ComponentStorage`
//! 3. **Names are persisted, indices are not** - type indices live for one process only
//!
//! ## Example
//!
//! ```rust,ignore
//! use meridian_core::{ComponentStore, EntityStorage, Entity};
//!
//! let mut entities = EntityStorage::new();
//! let mut positions = ComponentStore::<Position>::new(true);
//! let e = entities.allocate(Entity::default());
//! positions.add(e, Position { x: 1.0, y: 2.0, z: 3.0 });
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod ecs;
pub mod error;
pub mod io;

pub use ecs::{
    Component, ComponentStorage, ComponentStore, ComponentTypes, Entity, EntityStorage,
    EntityTemplate, HEntity, HandleArray,
};
pub use error::{CoreError, CoreResult};
pub use io::{BaseStream, BinaryReader, BinaryWriter};
