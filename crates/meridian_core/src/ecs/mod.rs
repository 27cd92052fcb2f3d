//! # Entity Component System
//!
//! Storage primitives for the game world.
//!
//! ## Design Philosophy
//!
//! - Entity IDs are indices with generation counters
//! - Components live in per-type sparse sets for O(1) typed access
//! - Base components stay encoded until first touched
//! - Dynamic dispatch only for whole-storage operations

mod component;
mod entity;
mod handle;
mod storage;
mod template;

pub use component::{Component, ComponentTypes};
pub use entity::{Entity, EntityStorage, KEY_IS_ACTIVE, KEY_LEVEL, KEY_TEMPLATE};
pub use handle::{HEntity, HandleArray};
pub use storage::{ComponentStorage, ComponentStore};
pub use template::EntityTemplate;
