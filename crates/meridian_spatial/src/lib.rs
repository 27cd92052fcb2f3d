//! # MERIDIAN Spatial
//!
//! Loose quadtree ("SPS") for visibility queries:
//! - [`morton`]: node codes, parents and common ancestors
//! - [`arena`]: parent-before-child node storage
//! - [`frustum`]: plane extraction and box classification
//! - [`sps`]: the tree, object records and frustum queries
//!
//! ## Example
//!
//! ```rust,ignore
//! use meridian_spatial::{Frustum, Sps, VisibilityCache};
//!
//! let mut sps = Sps::new(Vec3::ZERO, 1024.0, 8);
//! sps.add_record(aabb, object_id);
//!
//! let mut cache = VisibilityCache::new();
//! let mut visible = Vec::new();
//! sps.query_visible(&Frustum::from_view_projection(&view_proj), &mut cache, &mut visible);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod arena;
pub mod frustum;
pub mod morton;
pub mod sps;

pub use arena::NodeArena;
pub use frustum::{ClipStatus, Frustum, Plane};
pub use morton::Morton;
pub use sps::{
    QueryStats, RecordId, SpatialRecord, Sps, SpsConfig, TreeNode, VisibilityCache, NO_NODE,
};
