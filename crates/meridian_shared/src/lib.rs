//! # MERIDIAN Shared
//!
//! Common types used by every engine layer:
//!
//! - [`math`]: vectors, boxes, transforms and rays
//! - [`str_id`]: interned string identifiers
//! - [`data`]: the structured `Data`/`Params` value model
//! - [`resources`]: the reference-counted resource manager
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on entity, level or spatial code.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod data;
pub mod math;
pub mod resources;
pub mod str_id;

pub use data::{Data, Params};
pub use math::{Aabb, Quaternion, Ray, Transform, Vec3};
pub use resources::{Resource, ResourceManager};
pub use str_id::StrId;
