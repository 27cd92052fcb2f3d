//! # Scene Graph
//!
//! A tree of named transform frames. Each node owns its children and a list
//! of attributes; attributes receive the node's world transform and bring
//! the node into the level's spatial index and physics.
//!
//! ## Frame order
//!
//! 1. [`SceneNode::update`] propagates world transforms top-down and lets
//!    attributes react (level of detail, cached world boxes)
//! 2. [`NodeAttribute::sync`] pushes the fresh placement into SPS and physics

use crate::physics::{PhysicsLevel, PhysicsObjectId};
use meridian_shared::{Aabb, ResourceManager, StrId, Transform, Vec3};
use meridian_spatial::{RecordId, Sps};
use std::any::Any;
use std::fmt;

/// Level subsystems an attribute may register itself in.
pub struct SyncContext<'a> {
    /// Spatial index of the level
    pub sps: &'a mut Sps,
    /// Physics sub-level, if the level has one
    pub physics: Option<&'a mut dyn PhysicsLevel>,
}

/// Capability attached to a scene node.
pub trait NodeAttribute: Any + Send + Sync + fmt::Debug {
    /// Inactive attributes are skipped by the level's placement sync.
    fn is_active(&self) -> bool {
        true
    }

    /// Resolves the resources the attribute refers to.
    fn validate_resources(&mut self, _resources: &ResourceManager) -> bool {
        true
    }

    /// Creates the attribute's physics representation.
    fn attach_physics(&mut self, _physics: &mut dyn PhysicsLevel) -> bool {
        true
    }

    /// Called after the owning node's world transform is updated.
    fn update(&mut self, _world: &Transform, _cois: &[Vec3]) {}

    /// Brings the attribute's placement into the level subsystems.
    fn sync(&mut self, _ctx: &mut SyncContext<'_>) {}

    /// Removes everything [`NodeAttribute::sync`] and
    /// [`NodeAttribute::attach_physics`] registered.
    fn detach(&mut self, _ctx: &mut SyncContext<'_>) {}

    /// Copy for a cloned scene. Registrations are not copied.
    fn clone_attribute(&self) -> Box<dyn NodeAttribute>;

    /// Downcast support
    fn as_any(&self) -> &dyn Any;

    /// Downcast support
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl Clone for Box<dyn NodeAttribute> {
    fn clone(&self) -> Self {
        self.clone_attribute()
    }
}

/// Hierarchical transform frame.
#[derive(Debug, Clone)]
pub struct SceneNode {
    name: StrId,
    active: bool,
    local: Transform,
    world: Transform,
    world_changed: bool,
    children: Vec<SceneNode>,
    attributes: Vec<Box<dyn NodeAttribute>>,
}

impl Default for SceneNode {
    fn default() -> Self {
        Self::new(StrId::EMPTY)
    }
}

impl SceneNode {
    /// Separator of child paths.
    pub const PATH_SEPARATOR: char = '.';

    /// Creates an active node with identity transform.
    #[must_use]
    pub fn new(name: StrId) -> Self {
        Self {
            name,
            active: true,
            local: Transform::IDENTITY,
            world: Transform::IDENTITY,
            world_changed: true,
            children: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Node name
    #[must_use]
    pub const fn name(&self) -> StrId {
        self.name
    }

    /// Inactive nodes and their subtrees are not updated.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Enables or disables processing of this subtree.
    pub fn activate(&mut self, enable: bool) {
        self.active = enable;
    }

    /// Transform relative to the parent
    #[must_use]
    pub const fn local_transform(&self) -> &Transform {
        &self.local
    }

    /// Sets the transform relative to the parent.
    pub fn set_local_transform(&mut self, tfm: Transform) {
        self.local = tfm;
    }

    /// Sets the local translation.
    pub fn set_position(&mut self, position: Vec3) {
        self.local.position = position;
    }

    /// World transform as of the last update
    #[must_use]
    pub const fn world_transform(&self) -> &Transform {
        &self.world
    }

    /// True if the last update changed the world transform.
    #[must_use]
    pub const fn is_world_changed(&self) -> bool {
        self.world_changed
    }

    /// Returns the child `name`, creating an empty one if absent.
    pub fn create_child(&mut self, name: StrId) -> &mut Self {
        let pos = match self.children.iter().position(|c| c.name == name) {
            Some(pos) => pos,
            None => {
                self.children.push(Self::new(name));
                self.children.len() - 1
            }
        };
        &mut self.children[pos]
    }

    /// Inserts `node` as child `name`, replacing a child with that name.
    pub fn add_child(&mut self, name: StrId, mut node: Self) -> &mut Self {
        node.name = name;
        node.world_changed = true;
        let pos = match self.children.iter().position(|c| c.name == name) {
            Some(pos) => {
                self.children[pos] = node;
                pos
            }
            None => {
                self.children.push(node);
                self.children.len() - 1
            }
        };
        &mut self.children[pos]
    }

    /// Detaches and returns the child `name`.
    pub fn remove_child(&mut self, name: StrId) -> Option<Self> {
        let pos = self.children.iter().position(|c| c.name == name)?;
        Some(self.children.remove(pos))
    }

    /// Direct child by name
    #[must_use]
    pub fn child(&self, name: StrId) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Direct child by name
    pub fn child_mut(&mut self, name: StrId) -> Option<&mut Self> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Descendant by dot-separated path, e.g. `"body.arm.hand"`.
    #[must_use]
    pub fn find_child(&self, path: &str) -> Option<&Self> {
        path.split(Self::PATH_SEPARATOR)
            .try_fold(self, |node, part| node.child(StrId::new(part)))
    }

    /// Descendant by dot-separated path
    pub fn find_child_mut(&mut self, path: &str) -> Option<&mut Self> {
        path.split(Self::PATH_SEPARATOR)
            .try_fold(self, |node, part| node.child_mut(StrId::new(part)))
    }

    /// Number of direct children
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Direct children
    pub fn children(&self) -> impl Iterator<Item = &Self> + '_ {
        self.children.iter()
    }

    /// Adds an attribute.
    pub fn add_attribute(&mut self, attr: Box<dyn NodeAttribute>) {
        self.attributes.push(attr);
    }

    /// Removes and returns the attribute at `index`.
    pub fn remove_attribute(&mut self, index: usize) -> Option<Box<dyn NodeAttribute>> {
        (index < self.attributes.len()).then(|| self.attributes.remove(index))
    }

    /// Number of attributes
    #[must_use]
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Attributes in insertion order
    pub fn attributes(&self) -> impl Iterator<Item = &dyn NodeAttribute> + '_ {
        self.attributes.iter().map(|a| &**a)
    }

    /// Attributes in insertion order
    pub fn attributes_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn NodeAttribute>> + '_ {
        self.attributes.iter_mut()
    }

    /// First attribute of type `T`
    #[must_use]
    pub fn find_first_attribute<T: NodeAttribute>(&self) -> Option<&T> {
        self.attributes
            .iter()
            .find_map(|a| a.as_any().downcast_ref::<T>())
    }

    /// First attribute of type `T`
    pub fn find_first_attribute_mut<T: NodeAttribute>(&mut self) -> Option<&mut T> {
        self.attributes
            .iter_mut()
            .find_map(|a| a.as_any_mut().downcast_mut::<T>())
    }

    /// Depth-first pre-order walk. Stops as soon as `visitor` returns false
    /// and reports whether the walk completed.
    pub fn visit<F: FnMut(&mut Self) -> bool>(&mut self, visitor: &mut F) -> bool {
        if !visitor(self) {
            return false;
        }
        self.children.iter_mut().all(|child| child.visit(visitor))
    }

    /// Read-only version of [`SceneNode::visit`].
    pub fn visit_ref<F: FnMut(&Self) -> bool>(&self, visitor: &mut F) -> bool {
        if !visitor(self) {
            return false;
        }
        self.children.iter().all(|child| child.visit_ref(visitor))
    }

    /// Recomputes world transforms of this active subtree and updates
    /// attributes. `cois` are the centers of interest of this frame.
    pub fn update(&mut self, parent: Option<&Transform>, cois: &[Vec3]) {
        if !self.active {
            return;
        }

        let world = parent.map_or(self.local, |p| p.combine(&self.local));
        self.world_changed = world != self.world;
        self.world = world;

        for attr in &mut self.attributes {
            attr.update(&world, cois);
        }
        for child in &mut self.children {
            child.update(Some(&world), cois);
        }
    }
}

/// Renderable bounds registered in the level SPS.
#[derive(Debug)]
pub struct BoundsAttribute {
    local_box: Aabb,
    world_box: Aabb,
    user_data: u64,
    active: bool,
    always_visible: bool,
    record: Option<RecordId>,
    registered_always_visible: bool,
}

impl BoundsAttribute {
    /// Creates bounds reported to SPS queries as `user_data`.
    #[must_use]
    pub fn new(local_box: Aabb, user_data: u64) -> Self {
        Self {
            local_box,
            world_box: local_box,
            user_data,
            active: true,
            always_visible: false,
            record: None,
            registered_always_visible: false,
        }
    }

    /// Bounds returned by every query, like ambient lighting.
    #[must_use]
    pub fn always_visible(user_data: u64) -> Self {
        Self {
            always_visible: true,
            ..Self::new(Aabb::default(), user_data)
        }
    }

    /// Box in node space
    #[must_use]
    pub const fn local_box(&self) -> Aabb {
        self.local_box
    }

    /// Changes the node-space box; takes effect on the next update.
    pub fn set_local_box(&mut self, local_box: Aabb) {
        self.local_box = local_box;
    }

    /// Box in world space as of the last update
    #[must_use]
    pub const fn world_box(&self) -> Aabb {
        self.world_box
    }

    /// SPS record, once synced
    #[must_use]
    pub const fn record(&self) -> Option<RecordId> {
        self.record
    }

    /// Value reported by SPS queries
    #[must_use]
    pub const fn user_data(&self) -> u64 {
        self.user_data
    }

    /// Enables or disables SPS sync.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }
}

impl NodeAttribute for BoundsAttribute {
    fn is_active(&self) -> bool {
        self.active
    }

    fn update(&mut self, world: &Transform, _cois: &[Vec3]) {
        self.world_box = if self.local_box.is_valid() {
            self.local_box.transformed(world)
        } else {
            self.local_box
        };
    }

    fn sync(&mut self, ctx: &mut SyncContext<'_>) {
        if self.always_visible {
            if !self.registered_always_visible {
                ctx.sps.add_always_visible(self.user_data);
                self.registered_always_visible = true;
            }
            return;
        }

        match self.record {
            Some(id) => {
                ctx.sps.update_record(id, self.world_box);
            }
            None => self.record = Some(ctx.sps.add_record(self.world_box, self.user_data)),
        }
    }

    fn detach(&mut self, ctx: &mut SyncContext<'_>) {
        if let Some(id) = self.record.take() {
            ctx.sps.remove_record(id);
        }
        if self.registered_always_visible {
            ctx.sps.remove_always_visible(self.user_data);
            self.registered_always_visible = false;
        }
    }

    fn clone_attribute(&self) -> Box<dyn NodeAttribute> {
        Box::new(Self {
            record: None,
            registered_always_visible: false,
            ..*self
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Collision box registered in the level physics.
#[derive(Debug)]
pub struct CollisionAttribute {
    local_box: Aabb,
    world_box: Aabb,
    group: u16,
    mask: u16,
    body: Option<PhysicsObjectId>,
}

impl CollisionAttribute {
    /// Creates a collision box in collision group `group` that collides
    /// with groups in `mask`.
    #[must_use]
    pub fn new(local_box: Aabb, group: u16, mask: u16) -> Self {
        Self {
            local_box,
            world_box: local_box,
            group,
            mask,
            body: None,
        }
    }

    /// Physics body, once attached
    #[must_use]
    pub const fn body(&self) -> Option<PhysicsObjectId> {
        self.body
    }

    /// Box in world space as of the last update
    #[must_use]
    pub const fn world_box(&self) -> Aabb {
        self.world_box
    }
}

impl NodeAttribute for CollisionAttribute {
    fn attach_physics(&mut self, physics: &mut dyn PhysicsLevel) -> bool {
        if self.body.is_none() {
            self.body = Some(physics.add_body(self.world_box, self.group, self.mask));
        }
        true
    }

    fn update(&mut self, world: &Transform, _cois: &[Vec3]) {
        self.world_box = self.local_box.transformed(world);
    }

    fn sync(&mut self, ctx: &mut SyncContext<'_>) {
        if let (Some(body), Some(physics)) = (self.body, ctx.physics.as_deref_mut()) {
            physics.set_body_aabb(body, self.world_box);
        }
    }

    fn detach(&mut self, ctx: &mut SyncContext<'_>) {
        if let (Some(body), Some(physics)) = (self.body.take(), ctx.physics.as_deref_mut()) {
            physics.remove_body(body);
        }
    }

    fn clone_attribute(&self) -> Box<dyn NodeAttribute> {
        Box::new(Self {
            body: None,
            ..*self
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
