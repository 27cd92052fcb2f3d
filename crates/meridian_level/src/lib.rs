//! # MERIDIAN Level
//!
//! A level binds the spatial and physical side of one place:
//! - [`scene`]: the scene graph and node attribute capabilities
//! - [`physics`]: the physics sub-level interface and a kinematic box world
//! - [`navigation`]: navmesh resources and per-region runtime state
//! - [`level`]: `GameLevel`, which updates all of the above every frame
//!
//! ## Example
//!
//! ```rust,ignore
//! use meridian_level::{GameLevel, LevelDesc};
//!
//! let desc = LevelDesc::from_file("levels/harbor.toml")?;
//! let mut level = GameLevel::load_from_desc(StrId::new("harbor"), &desc, &resources, &config);
//! level.validate(&resources);
//! level.update(dt, &[camera_pos]);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod desc;
pub mod error;
pub mod level;
pub mod navigation;
pub mod physics;
pub mod scene;

pub use desc::{LevelDesc, NavigationDesc, DEFAULT_SUBDIVISION_DEPTH};
pub use error::{LevelError, LevelResult};
pub use level::GameLevel;
pub use navigation::{NavMap, NavMesh, NAV_FLAG_LOCKED};
pub use physics::{BoxPhysicsLevel, CollisionGroups, PhysicsLevel, PhysicsObjectId, RayContact};
pub use scene::{BoundsAttribute, CollisionAttribute, NodeAttribute, SceneNode, SyncContext};
