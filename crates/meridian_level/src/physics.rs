//! # Physics Sub-Level
//!
//! The level drives physics through [`PhysicsLevel`]: a tick and a closest
//! ray contact query, plus body registration for collision attributes.
//! [`BoxPhysicsLevel`] is a kinematic implementation over world-space boxes.

use meridian_shared::{Aabb, Ray, Vec3};
use std::collections::BTreeMap;
use std::fmt;

/// Handle of a body inside a physics level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysicsObjectId(u32);

impl PhysicsObjectId {
    /// Raw value
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Result of a ray query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayContact {
    /// Body that was hit
    pub object: PhysicsObjectId,
    /// Hit point in world space
    pub point: Vec3,
    /// Segment parameter of the hit in `[0, 1]`
    pub fraction: f32,
}

/// Named collision group bits.
#[derive(Debug, Clone)]
pub struct CollisionGroups {
    names: Vec<String>,
}

impl CollisionGroups {
    /// Group of ordinary bodies.
    pub const DEFAULT: &'static str = "Default";
    /// Group of picking rays.
    pub const PROBE: &'static str = "Probe";
    /// Pseudo-group matching every group.
    pub const ALL: &'static str = "All";

    /// Creates the table with the predefined groups.
    #[must_use]
    pub fn new() -> Self {
        Self {
            names: vec![Self::DEFAULT.to_owned(), Self::PROBE.to_owned()],
        }
    }

    /// Mask of a known group, 0 for unknown names.
    #[must_use]
    pub fn mask(&self, name: &str) -> u16 {
        if name == Self::ALL {
            return u16::MAX;
        }
        self.names
            .iter()
            .position(|n| n == name)
            .map_or(0, |bit| 1 << bit)
    }

    /// Returns the mask of `name`, assigning a new bit if needed.
    /// Returns 0 once all 16 bits are taken.
    pub fn register(&mut self, name: &str) -> u16 {
        let mask = self.mask(name);
        if mask != 0 {
            return mask;
        }
        if self.names.len() >= 16 {
            tracing::warn!("no free collision group bit for '{}'", name);
            return 0;
        }
        self.names.push(name.to_owned());
        1 << (self.names.len() - 1)
    }
}

impl Default for CollisionGroups {
    fn default() -> Self {
        Self::new()
    }
}

/// Physics world driven by a game level.
pub trait PhysicsLevel: Send + Sync {
    /// World bounds the level was created for.
    fn bounds(&self) -> Aabb;

    /// Advances the simulation.
    fn update(&mut self, dt: f32);

    /// Collision group table.
    fn collision_groups(&self) -> &CollisionGroups;

    /// Adds a body.
    fn add_body(&mut self, aabb: Aabb, group: u16, mask: u16) -> PhysicsObjectId;

    /// Moves a body. Returns false for unknown ids.
    fn set_body_aabb(&mut self, id: PhysicsObjectId, aabb: Aabb) -> bool;

    /// Removes a body. Returns false for unknown ids.
    fn remove_body(&mut self, id: PhysicsObjectId) -> bool;

    /// Closest body hit by the segment `start..end` whose group and mask
    /// pass the query's `group`/`mask` filter.
    fn closest_ray_contact(&self, start: Vec3, end: Vec3, group: u16, mask: u16)
        -> Option<RayContact>;
}

#[derive(Debug, Clone, Copy)]
struct Body {
    aabb: Aabb,
    velocity: Vec3,
    group: u16,
    mask: u16,
}

/// Kinematic box world.
///
/// Bodies move by their velocity on every tick; there is no collision
/// response.
pub struct BoxPhysicsLevel {
    bounds: Aabb,
    groups: CollisionGroups,
    bodies: BTreeMap<PhysicsObjectId, Body>,
    next_id: u32,
    time: f64,
}

impl BoxPhysicsLevel {
    /// Creates an empty world.
    #[must_use]
    pub fn new(bounds: Aabb) -> Self {
        Self {
            bounds,
            groups: CollisionGroups::new(),
            bodies: BTreeMap::new(),
            next_id: 1,
            time: 0.0,
        }
    }

    /// Mutable collision group table
    pub fn collision_groups_mut(&mut self) -> &mut CollisionGroups {
        &mut self.groups
    }

    /// Sets a body's velocity. Returns false for unknown ids.
    pub fn set_body_velocity(&mut self, id: PhysicsObjectId, velocity: Vec3) -> bool {
        match self.bodies.get_mut(&id) {
            Some(body) => {
                body.velocity = velocity;
                true
            }
            None => false,
        }
    }

    /// Current box of a body
    #[must_use]
    pub fn body_aabb(&self, id: PhysicsObjectId) -> Option<Aabb> {
        self.bodies.get(&id).map(|b| b.aabb)
    }

    /// Number of bodies
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Total simulated time in seconds
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.time
    }
}

impl fmt::Debug for BoxPhysicsLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxPhysicsLevel")
            .field("bounds", &self.bounds)
            .field("bodies", &self.bodies.len())
            .field("time", &self.time)
            .finish_non_exhaustive()
    }
}

impl PhysicsLevel for BoxPhysicsLevel {
    fn bounds(&self) -> Aabb {
        self.bounds
    }

    fn update(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        for body in self.bodies.values_mut() {
            let offset = body.velocity * dt;
            body.aabb = Aabb::new(body.aabb.min + offset, body.aabb.max + offset);
        }
        self.time += f64::from(dt);
    }

    fn collision_groups(&self) -> &CollisionGroups {
        &self.groups
    }

    fn add_body(&mut self, aabb: Aabb, group: u16, mask: u16) -> PhysicsObjectId {
        let id = PhysicsObjectId(self.next_id);
        self.next_id += 1;
        self.bodies.insert(
            id,
            Body {
                aabb,
                velocity: Vec3::ZERO,
                group,
                mask,
            },
        );
        id
    }

    fn set_body_aabb(&mut self, id: PhysicsObjectId, aabb: Aabb) -> bool {
        match self.bodies.get_mut(&id) {
            Some(body) => {
                body.aabb = aabb;
                true
            }
            None => false,
        }
    }

    fn remove_body(&mut self, id: PhysicsObjectId) -> bool {
        self.bodies.remove(&id).is_some()
    }

    fn closest_ray_contact(
        &self,
        start: Vec3,
        end: Vec3,
        group: u16,
        mask: u16,
    ) -> Option<RayContact> {
        let ray = Ray::segment(start, end);
        self.bodies
            .iter()
            .filter(|(_, b)| b.group & mask != 0 && group & b.mask != 0)
            .filter_map(|(id, b)| b.aabb.intersect_ray(&ray, 1.0).map(|t| (*id, t)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(object, fraction)| RayContact {
                object,
                point: ray.at(fraction),
                fraction,
            })
    }
}
