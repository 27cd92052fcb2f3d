//! # Game Level
//!
//! One place in the game world: a scene graph root, a physics sub-level,
//! the SPS covering the level bounds and the navigation table.
//!
//! ## Navigation table
//!
//! Navmeshes are sorted by agent radius, then by agent height, ascending.
//! A query returns the first entry whose agent size fits within the asked
//! size, which is the smallest mesh that still satisfies the query.

use crate::desc::LevelDesc;
use crate::navigation::{NavMap, NavMesh};
use crate::physics::{BoxPhysicsLevel, CollisionGroups, PhysicsLevel, RayContact};
use crate::scene::{SceneNode, SyncContext};
use meridian_core::HEntity;
use meridian_shared::{Aabb, Ray, ResourceManager, StrId, Vec3};
use meridian_spatial::{Sps, SpsConfig};
use std::fmt;
use std::sync::Arc;

/// A game level.
pub struct GameLevel {
    id: StrId,
    bounds: Aabb,
    interactive_bounds: Aabb,
    scene_root: SceneNode,
    physics: Option<Box<dyn PhysicsLevel>>,
    sps: Sps,
    nav_maps: Vec<NavMap>,
}

impl GameLevel {
    /// Creates an empty level with a [`BoxPhysicsLevel`] over `bounds`.
    ///
    /// The SPS is square in XZ, sized to the larger horizontal side.
    #[must_use]
    pub fn new(
        id: StrId,
        bounds: Aabb,
        interactive_bounds: Aabb,
        subdivision_depth: u32,
        config: &SpsConfig,
    ) -> Self {
        let size = bounds.size();
        Self {
            id,
            bounds,
            interactive_bounds,
            scene_root: SceneNode::new(id),
            physics: Some(Box::new(BoxPhysicsLevel::new(bounds))),
            sps: Sps::with_config(bounds.center(), size.x.max(size.z), subdivision_depth, config),
            nav_maps: Vec::new(),
        }
    }

    /// Builds a level from its description.
    ///
    /// Static scene resources are adopted when the description allows it and
    /// nobody but the resource manager holds them; adopted resources are
    /// unregistered so no one else picks them up. Otherwise they are cloned.
    #[must_use]
    pub fn load_from_desc(
        id: StrId,
        desc: &LevelDesc,
        resources: &ResourceManager,
        config: &SpsConfig,
    ) -> Self {
        let mut level = Self::new(
            id,
            desc.bounds(),
            desc.interactive_bounds(),
            desc.effective_depth(),
            config,
        );

        for (child_name, scene_id) in &desc.static_scene {
            let uid = StrId::new(scene_id);
            let rsrc = resources.register_resource::<SceneNode>(uid);
            let Some(scene) = rsrc.validate_object::<SceneNode>() else {
                tracing::warn!("level '{}': static scene '{}' not loaded", id, uid);
                continue;
            };

            // The manager and this call hold the resource, the resource and
            // this call hold the scene
            let node = if desc.static_scene_is_unique
                && Arc::strong_count(&rsrc) <= 2
                && Arc::strong_count(&scene) <= 2
            {
                drop(scene);
                resources.unregister_resource(uid);
                tracing::debug!("level '{}': adopted static scene '{}'", id, uid);
                rsrc.take_object::<SceneNode>()
                    .map(|owned| Arc::try_unwrap(owned).unwrap_or_else(|shared| (*shared).clone()))
            } else {
                tracing::debug!("level '{}': cloned static scene '{}'", id, uid);
                Some((*scene).clone())
            };

            if let Some(node) = node {
                level.scene_root.add_child(StrId::new(child_name), node);
            }
        }

        for nav in &desc.navigation {
            if nav.agent_radius <= 0.0 || nav.agent_height <= 0.0 || nav.nav_mesh.is_empty() {
                tracing::warn!(
                    "level '{}': navmesh '{}' rejected, agent radius {} height {}",
                    id,
                    nav.nav_mesh,
                    nav.agent_radius,
                    nav.agent_height
                );
                continue;
            }

            let rsrc = resources.register_resource::<NavMesh>(StrId::new(&nav.nav_mesh));
            if nav.preload && rsrc.validate_object::<NavMesh>().is_none() {
                tracing::warn!("level '{}': navmesh '{}' failed to preload", id, nav.nav_mesh);
            }
            level
                .nav_maps
                .push(NavMap::new(nav.agent_radius, nav.agent_height, rsrc));
        }

        level.nav_maps.sort_by(|a, b| {
            a.agent_radius()
                .total_cmp(&b.agent_radius())
                .then(a.agent_height().total_cmp(&b.agent_height()))
        });

        level
    }

    /// Level id
    #[must_use]
    pub const fn id(&self) -> StrId {
        self.id
    }

    /// Level bounds
    #[must_use]
    pub const fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Bounds of the interactive area
    #[must_use]
    pub const fn interactive_bounds(&self) -> Aabb {
        self.interactive_bounds
    }

    /// Scene root
    #[must_use]
    pub const fn scene_root(&self) -> &SceneNode {
        &self.scene_root
    }

    /// Scene root
    pub fn scene_root_mut(&mut self) -> &mut SceneNode {
        &mut self.scene_root
    }

    /// Spatial index
    #[must_use]
    pub const fn sps(&self) -> &Sps {
        &self.sps
    }

    /// Spatial index
    pub fn sps_mut(&mut self) -> &mut Sps {
        &mut self.sps
    }

    /// Physics sub-level
    #[must_use]
    pub fn physics(&self) -> Option<&dyn PhysicsLevel> {
        self.physics.as_deref()
    }

    /// Physics sub-level
    pub fn physics_mut(&mut self) -> Option<&mut (dyn PhysicsLevel + 'static)> {
        self.physics.as_deref_mut()
    }

    /// Replaces the physics sub-level. `None` runs the level without physics.
    pub fn set_physics(&mut self, physics: Option<Box<dyn PhysicsLevel>>) {
        self.physics = physics;
    }

    /// Navigation maps in table order
    #[must_use]
    pub fn nav_maps(&self) -> &[NavMap] {
        &self.nav_maps
    }

    /// Resolves resources of every scene attribute, then attaches collision
    /// attributes to physics. Stops at the first failure.
    pub fn validate(&mut self, resources: &ResourceManager) -> bool {
        let resolved = self.scene_root.visit(&mut |node| {
            node.attributes_mut()
                .all(|attr| attr.validate_resources(resources))
        });
        if !resolved {
            tracing::warn!("level '{}': scene resources failed to validate", self.id);
            return false;
        }

        if let Some(physics) = self.physics.as_deref_mut() {
            return self.scene_root.visit(&mut |node| {
                node.attributes_mut().all(|attr| attr.attach_physics(physics))
            });
        }
        true
    }

    /// Advances physics, updates the scene and moves active attributes in
    /// the spatial index.
    pub fn update(&mut self, dt: f32, cois: &[Vec3]) {
        if let Some(physics) = self.physics.as_deref_mut() {
            physics.update(dt);
        }

        self.scene_root.update(None, cois);

        let mut ctx = SyncContext {
            sps: &mut self.sps,
            physics: self
                .physics
                .as_mut()
                .map(|p| &mut **p as &mut dyn PhysicsLevel),
        };
        self.scene_root.visit(&mut |node| {
            for attr in node.attributes_mut() {
                if attr.is_active() {
                    attr.sync(&mut ctx);
                }
            }
            true
        });
    }

    /// Detaches the top-level scene child `name`, removing its attributes
    /// from the spatial index and physics.
    pub fn remove_scene_child(&mut self, name: StrId) -> Option<SceneNode> {
        let mut node = self.scene_root.remove_child(name)?;
        let mut ctx = SyncContext {
            sps: &mut self.sps,
            physics: self
                .physics
                .as_mut()
                .map(|p| &mut **p as &mut dyn PhysicsLevel),
        };
        node.visit(&mut |n| {
            for attr in n.attributes_mut() {
                attr.detach(&mut ctx);
            }
            true
        });
        Some(node)
    }

    /// Closest physics body hit by `ray` treated as a segment, probing all
    /// collision groups.
    #[must_use]
    pub fn get_first_pick_intersection(&self, ray: &Ray) -> Option<RayContact> {
        let physics = self.physics.as_deref()?;
        let groups = physics.collision_groups();
        physics.closest_ray_contact(
            ray.origin,
            ray.end(),
            groups.mask(CollisionGroups::PROBE),
            groups.mask(CollisionGroups::ALL),
        )
    }

    /// First navigation map usable by an agent of the given size.
    #[must_use]
    pub fn get_nav_map(&self, agent_radius: f32, agent_height: f32) -> Option<&NavMap> {
        self.nav_maps
            .iter()
            .find(|m| m.agent_radius() <= agent_radius && m.agent_height() <= agent_height)
    }

    /// Navmesh of [`GameLevel::get_nav_map`], loading it if needed.
    #[must_use]
    pub fn get_nav_mesh(&self, agent_radius: f32, agent_height: f32) -> Option<Arc<NavMesh>> {
        self.get_nav_map(agent_radius, agent_height)?.nav_mesh()
    }

    /// Sets the controller of `region` in every navigation map.
    pub fn set_nav_region_controller(&mut self, region: StrId, controller: HEntity) {
        for map in &mut self.nav_maps {
            map.set_region_controller(region, controller);
        }
    }

    /// Raises or clears region flags in every navigation map.
    pub fn set_nav_region_flags(&mut self, region: StrId, flags: u16, on: bool) {
        for map in &mut self.nav_maps {
            map.set_region_flags(region, flags, on);
        }
    }
}

impl fmt::Debug for GameLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameLevel")
            .field("id", &self.id)
            .field("bounds", &self.bounds)
            .field("nodes", &self.sps.node_count())
            .field("records", &self.sps.record_count())
            .field("nav_maps", &self.nav_maps.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{BoundsAttribute, CollisionAttribute, NodeAttribute};
    use std::any::Any;

    fn level() -> GameLevel {
        GameLevel::load_from_desc(
            StrId::new("test"),
            &LevelDesc::default(),
            &ResourceManager::new(),
            &SpsConfig::default(),
        )
    }

    fn unit_box() -> Aabb {
        Aabb::from_center_extent(Vec3::ZERO, Vec3::splat(0.5))
    }

    #[derive(Debug)]
    struct Broken;

    impl NodeAttribute for Broken {
        fn validate_resources(&mut self, _resources: &ResourceManager) -> bool {
            false
        }
        fn clone_attribute(&self) -> Box<dyn NodeAttribute> {
            Box::new(Broken)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_default_depth() {
        let level = level();
        assert_eq!(level.sps().max_depth(), crate::desc::DEFAULT_SUBDIVISION_DEPTH);
        assert!((level.sps().world_extent() - 256.0).abs() < f32::EPSILON);
        assert_eq!(level.scene_root().name(), StrId::new("test"));
    }

    #[test]
    fn test_update_syncs_sps() {
        let mut level = level();
        let node = level.scene_root_mut().create_child(StrId::new("crate"));
        node.set_position(Vec3::new(20.0, 0.0, 20.0));
        node.add_attribute(Box::new(BoundsAttribute::new(unit_box(), 77)));

        level.update(0.016, &[]);
        assert_eq!(level.sps().record_count(), 1);
        let (_, record) = level.sps().records().next().unwrap();
        assert_eq!(record.user_data, 77);
        assert_eq!(record.aabb.center(), Vec3::new(20.0, 0.0, 20.0));

        level
            .scene_root_mut()
            .child_mut(StrId::new("crate"))
            .unwrap()
            .set_position(Vec3::new(-20.0, 0.0, 0.0));
        level.update(0.016, &[]);
        let (_, record) = level.sps().records().next().unwrap();
        assert_eq!(record.aabb.center(), Vec3::new(-20.0, 0.0, 0.0));
        assert_eq!(record.bounds_version, 2);

        assert!(level.remove_scene_child(StrId::new("crate")).is_some());
        assert_eq!(level.sps().record_count(), 0);
        assert_eq!(level.sps().node_count(), 1);
    }

    #[test]
    fn test_validate_stops_on_failure() {
        let mut level = level();
        let resources = ResourceManager::new();
        level
            .scene_root_mut()
            .create_child(StrId::new("bad"))
            .add_attribute(Box::new(Broken));
        assert!(!level.validate(&resources));
    }

    #[test]
    fn test_pick_through_collision_attribute() {
        let mut level = level();
        let resources = ResourceManager::new();
        let node = level.scene_root_mut().create_child(StrId::new("wall"));
        node.set_position(Vec3::new(5.0, 0.0, 0.0));
        node.add_attribute(Box::new(CollisionAttribute::new(unit_box(), 1, u16::MAX)));

        assert!(level.validate(&resources));
        level.update(0.0, &[]);

        let hit = level
            .get_first_pick_intersection(&Ray::segment(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)))
            .unwrap();
        assert!((hit.point.x - 4.5).abs() < 1e-4);

        level.set_physics(None);
        assert!(level
            .get_first_pick_intersection(&Ray::segment(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)))
            .is_none());
    }
}
