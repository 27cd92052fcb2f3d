//! # Game World
//!
//! The world owns every entity, every component storage and every level.
//! It keeps two universes side by side:
//!
//! - **base**: the loaded snapshot, read-only once loaded
//! - **actual**: the live state that gameplay mutates
//!
//! Saving writes either the whole actual state or its difference against
//! base. Loading a diff rebuilds actual as base plus that difference.
//!
//! ## State machine
//!
//! ```text
//!            load_base (binary)            start
//! Stopped ─────────────────────> BaseLoaded ─────> Running
//!    ^  ^                            │               │
//!    │  └──────── load_diff ─────────┘               │
//!    └──────────────────── stop ─────────────────────┘
//! ```
//!
//! `stop` only leaves `Running`. A world that was never started has
//! nothing to pause.

mod binary;
mod join;
mod params;
mod registry;

pub use join::Join;
pub use registry::StorageRegistry;

use crate::config::{MeridianConfig, WorldConfig};
use meridian_core::{
    BaseStream, Component, ComponentStorage, ComponentStore, Entity, EntityStorage,
    EntityTemplate, HEntity,
};
use meridian_level::{GameLevel, LevelDesc, DEFAULT_SUBDIVISION_DEPTH};
use meridian_shared::{Aabb, Data, ResourceManager, StrId};
use meridian_spatial::SpsConfig;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a [`GameWorld`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WorldState {
    /// Actual state is present, simulation is off.
    #[default]
    Stopped,
    /// Base snapshot loaded, actual state not built yet.
    BaseLoaded,
    /// Simulation is on.
    Running,
}

/// Entity/component world.
pub struct GameWorld {
    resources: Arc<ResourceManager>,
    config: WorldConfig,
    spatial: SpsConfig,
    state: WorldState,

    entities: EntityStorage,
    entities_base: EntityStorage,
    storages: StorageRegistry,
    base_stream: Option<BaseStream>,

    levels: BTreeMap<StrId, GameLevel>,
}

impl GameWorld {
    /// Creates an empty world with the default configuration.
    #[must_use]
    pub fn new(resources: Arc<ResourceManager>) -> Self {
        Self::with_config(resources, &MeridianConfig::default())
    }

    /// Creates an empty world.
    #[must_use]
    pub fn with_config(resources: Arc<ResourceManager>, config: &MeridianConfig) -> Self {
        let capacity = config.world.initial_entity_capacity;
        Self {
            resources,
            config: config.world.clone(),
            spatial: config.spatial,
            state: WorldState::Stopped,
            entities: EntityStorage::with_capacity(capacity),
            entities_base: EntityStorage::new(),
            storages: StorageRegistry::new(),
            base_stream: None,
            levels: BTreeMap::new(),
        }
    }

    /// Resource manager templates and level resources come from.
    #[must_use]
    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> WorldState {
        self.state
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Builds the actual state if needed and turns simulation on.
    pub fn start(&mut self) {
        if self.state != WorldState::Running {
            self.finalize_loading();
            self.state = WorldState::Running;
            tracing::debug!("world started with {} entities", self.entities.len());
        }
    }

    /// Turns simulation off. Ignored unless running.
    pub fn stop(&mut self) {
        if self.state == WorldState::Running {
            self.state = WorldState::Stopped;
            tracing::debug!("world stopped");
        }
    }

    /// Copies base into actual when the world was loaded without a diff.
    /// Does nothing outside [`WorldState::BaseLoaded`].
    pub fn finalize_loading(&mut self) {
        if self.state != WorldState::BaseLoaded {
            return;
        }
        self.copy_base_to_actual();
        self.state = WorldState::Stopped;
    }

    /// Drops all entities and components, base included. Levels are kept.
    pub fn clear_all(&mut self, initial_capacity: usize) {
        self.base_stream = None;
        self.entities_base.clear(initial_capacity);
        self.entities.clear(initial_capacity);
        for storage in self.storages.iter_mut() {
            storage.clear_all();
        }
        self.state = WorldState::Stopped;
    }

    /// Drops the actual state, returning to the loaded base.
    ///
    /// Ignored when there is no base or the actual state was never built.
    pub fn clear_diff(&mut self) {
        if self.state == WorldState::BaseLoaded || self.entities_base.is_empty() {
            return;
        }
        self.entities.clear(self.entities_base.len());
        for storage in self.storages.iter_mut() {
            storage.clear_diff();
        }
        self.state = WorldState::BaseLoaded;
    }

    /// Rebuilds actual as an exact copy of base.
    fn copy_base_to_actual(&mut self) {
        self.entities.clear(self.entities_base.len());
        for (entity, record) in self.entities_base.iter() {
            let placed = self.entities.allocate_with_handle(entity, *record);
            debug_assert!(placed, "base entity {entity:?} collides in the actual state");
        }
        for storage in self.storages.iter_mut() {
            storage.clear_diff();
        }
    }

    /// Base stream from `offset` on, for reading base data that was left
    /// encoded at load time.
    #[must_use]
    pub fn get_base_stream(&self, offset: usize) -> Option<&[u8]> {
        let stream = self.base_stream.as_deref()?;
        (offset < stream.len()).then(|| &stream[offset..])
    }

    // =========================================================================
    // COMPONENT TYPES
    // =========================================================================

    /// Registers a storage for `T`. Register every type before creating
    /// or loading entities; registering again drops the existing data.
    pub fn register_component<T: Component>(&mut self) {
        self.storages
            .register::<T>(self.config.lazy_base_components);
    }

    /// Typed storage of `T`.
    #[must_use]
    pub fn find_storage<T: Component>(&self) -> Option<&ComponentStore<T>> {
        self.storages.store::<T>()
    }

    /// Mutable typed storage of `T`.
    pub fn find_storage_mut<T: Component>(&mut self) -> Option<&mut ComponentStore<T>> {
        self.storages.store_mut::<T>()
    }

    /// Storage persisted under `name`.
    #[must_use]
    pub fn find_storage_by_name(&self, name: StrId) -> Option<&dyn ComponentStorage> {
        self.storages.by_name(name)
    }

    /// Mutable storage persisted under `name`.
    pub fn find_storage_by_name_mut(
        &mut self,
        name: StrId,
    ) -> Option<&mut (dyn ComponentStorage + 'static)> {
        self.storages.by_name_mut(name)
    }

    /// All registered storages.
    #[must_use]
    pub const fn storages(&self) -> &StorageRegistry {
        &self.storages
    }

    // =========================================================================
    // ENTITIES
    // =========================================================================

    /// Creates an entity in `level_id` and fills in its template.
    ///
    /// If the template can't be resolved, the entity is kept but its
    /// template id is cleared.
    pub fn create_entity(&mut self, level_id: StrId, template_id: StrId) -> HEntity {
        let entity = self.entities.allocate(Entity::new(level_id, template_id));
        if !entity.is_valid() {
            return HEntity::INVALID;
        }

        if !self.instantiate_template(entity, template_id, false, true) {
            if let Some(record) = self.entities.get_mut(entity) {
                record.template_id = StrId::EMPTY;
            }
        }
        entity
    }

    /// Creates a copy of `prototype` with copies of all its components.
    ///
    /// Returns [`HEntity::INVALID`] if `prototype` doesn't exist.
    pub fn clone_entity(&mut self, prototype: HEntity) -> HEntity {
        let Some(record) = self.entities.get(prototype).copied() else {
            return HEntity::INVALID;
        };
        let entity = self.entities.allocate(record);
        if entity.is_valid() {
            for storage in self.storages.iter_mut() {
                storage.clone_component(prototype, entity);
            }
        }
        entity
    }

    /// Deletes an entity and all its components.
    pub fn delete_entity(&mut self, entity: HEntity) -> bool {
        if self.entities.free(entity).is_none() {
            return false;
        }
        for storage in self.storages.iter_mut() {
            storage.forget_entity(entity);
        }
        true
    }

    /// True if `entity` is alive in the actual state.
    #[must_use]
    pub fn entity_exists(&self, entity: HEntity) -> bool {
        self.entities.contains(entity)
    }

    /// Record of a live entity.
    #[must_use]
    pub fn get_entity(&self, entity: HEntity) -> Option<&Entity> {
        self.entities.get(entity)
    }

    /// Actual entity set.
    #[must_use]
    pub const fn entities(&self) -> &EntityStorage {
        &self.entities
    }

    /// Base entity set.
    #[must_use]
    pub const fn base_entities(&self) -> &EntityStorage {
        &self.entities_base
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// True if `entity` is alive and active.
    #[must_use]
    pub fn is_entity_active(&self, entity: HEntity) -> bool {
        self.entities.get(entity).is_some_and(|e| e.is_active)
    }

    /// Activates or deactivates an entity. Inactive entities are skipped
    /// by iteration.
    pub fn set_entity_active(&mut self, entity: HEntity, active: bool) -> bool {
        match self.entities.get_mut(entity) {
            Some(record) => {
                record.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Level of `entity`, empty if global or dead.
    #[must_use]
    pub fn get_entity_level(&self, entity: HEntity) -> StrId {
        self.entities
            .get(entity)
            .map_or(StrId::EMPTY, |e| e.level_id)
    }

    // =========================================================================
    // COMPONENTS
    // =========================================================================

    /// Attaches `value` to a live entity, replacing an existing component.
    pub fn add_component<T: Component>(&mut self, entity: HEntity, value: T) -> Option<&mut T> {
        if !self.entities.contains(entity) {
            return None;
        }
        self.storages.store_mut::<T>()?.add(entity, value)
    }

    /// Component `T` of `entity`.
    #[inline]
    #[must_use]
    pub fn find_component<T: Component>(&self, entity: HEntity) -> Option<&T> {
        self.storages.store::<T>()?.find(entity)
    }

    /// Mutable component `T` of `entity`.
    #[inline]
    pub fn find_component_mut<T: Component>(&mut self, entity: HEntity) -> Option<&mut T> {
        self.storages.store_mut::<T>()?.find_mut(entity)
    }

    /// Detaches component `T` from `entity`.
    pub fn remove_component<T: Component>(&mut self, entity: HEntity) -> bool {
        self.storages
            .store_mut::<T>()
            .is_some_and(|store| store.remove(entity).is_some())
    }

    /// Drops every `T`, base included.
    pub fn remove_all_components<T: Component>(&mut self) {
        if let Some(store) = self.storages.store_mut::<T>() {
            store.clear_all();
        }
    }

    /// Number of live `T` components.
    #[must_use]
    pub fn component_count<T: Component>(&self) -> usize {
        self.storages.store::<T>().map_or(0, ComponentStorage::len)
    }

    // =========================================================================
    // TEMPLATES
    // =========================================================================

    fn resolve_template(&self, template_id: StrId) -> Option<Arc<EntityTemplate>> {
        if template_id.is_empty() {
            return None;
        }
        self.resources
            .register_resource::<EntityTemplate>(template_id)
            .validate_object::<EntityTemplate>()
    }

    /// Data template `template_id` declares for `T`.
    #[must_use]
    pub fn get_template_component_data<T: Component>(&self, template_id: StrId) -> Option<Data> {
        self.storages.store::<T>()?;
        self.resolve_template(template_id)?
            .component(StrId::new(T::NAME))
            .cloned()
    }

    /// Data the template of `entity` declares for `T`.
    #[must_use]
    pub fn get_entity_template_component_data<T: Component>(&self, entity: HEntity) -> Option<Data> {
        let template_id = self.entities.get(entity)?.template_id;
        self.get_template_component_data::<T>(template_id)
    }

    /// Adds the components declared by `template_id` that `entity` doesn't
    /// have yet in the target state.
    ///
    /// Fails only if there's no entity or template to work with, or the
    /// template can't be resolved.
    fn instantiate_template(
        &mut self,
        entity: HEntity,
        template_id: StrId,
        into_base: bool,
        validate: bool,
    ) -> bool {
        if !entity.is_valid() || template_id.is_empty() {
            return false;
        }

        let Some(template) = self.resolve_template(template_id) else {
            tracing::error!("can't load entity template '{}'", template_id);
            return false;
        };

        for (name, data) in template.components() {
            if let Some(storage) = self.storages.by_name_mut(name) {
                storage.instantiate_template(entity, data, into_base, validate);
            }
        }
        true
    }

    /// Instantiates the templates of every base or actual entity.
    fn instantiate_all_templates(&mut self, into_base: bool) {
        let source = if into_base {
            &self.entities_base
        } else {
            &self.entities
        };
        let templated: Vec<(HEntity, StrId)> = source
            .iter()
            .filter(|(_, record)| !record.template_id.is_empty())
            .map(|(entity, record)| (entity, record.template_id))
            .collect();

        for (entity, template_id) in templated {
            self.instantiate_template(entity, template_id, into_base, false);
        }
    }

    // =========================================================================
    // ITERATION
    // =========================================================================

    /// Calls `f` for every active entity that has `D` and matches `J`.
    ///
    /// `D` drives the loop, so pick the rarest mandatory component.
    ///
    /// ```rust,ignore
    /// world.for_each_entity_with::<Position, (&Velocity, Option<&Health>), _>(
    ///     |entity, record, pos, (vel, health)| { ... },
    /// );
    /// ```
    pub fn for_each_entity_with<'w, D, J, F>(&'w self, f: F)
    where
        D: Component,
        J: Join,
        F: FnMut(HEntity, &'w Entity, &'w D, J::Item<'w>),
    {
        self.for_each_entity_with_filter::<D, J, _, _>(|_, _| true, f);
    }

    /// [`GameWorld::for_each_entity_with`] restricted to entities that
    /// pass `filter`.
    pub fn for_each_entity_with_filter<'w, D, J, P, F>(&'w self, mut filter: P, mut f: F)
    where
        D: Component,
        J: Join,
        P: FnMut(HEntity, &Entity) -> bool,
        F: FnMut(HEntity, &'w Entity, &'w D, J::Item<'w>),
    {
        let Some(driver) = self.storages.store::<D>() else {
            return;
        };
        let others = J::storages(&self.storages);

        for (entity, component) in driver.iter() {
            let Some(record) = self.entities.get(entity) else {
                continue;
            };
            if !record.is_active || !filter(entity, record) {
                continue;
            }
            if let Some(rest) = J::fetch(others, entity) {
                f(entity, record, component, rest);
            }
        }
    }

    /// [`GameWorld::for_each_entity_with`] for entities of one level.
    pub fn for_each_entity_in_level_with<'w, D, J, F>(&'w self, level_id: StrId, f: F)
    where
        D: Component,
        J: Join,
        F: FnMut(HEntity, &'w Entity, &'w D, J::Item<'w>),
    {
        self.for_each_entity_with_filter::<D, J, _, _>(
            |_, record| record.level_id == level_id,
            f,
        );
    }

    /// [`GameWorld::for_each_entity_with`] with mutable access to the
    /// driving component.
    ///
    /// The driving storage is lent out for the duration of the loop, so
    /// `J` can't also ask for `D`: such a request reads as missing.
    pub fn for_each_entity_with_mut<D, J, F>(&mut self, mut f: F)
    where
        D: Component,
        J: Join,
        F: for<'a> FnMut(HEntity, &'a Entity, &'a mut D, J::Item<'a>),
    {
        let Some((index, mut storage)) = self.storages.take::<D>() else {
            return;
        };

        if let Some(driver) = storage.as_any_mut().downcast_mut::<ComponentStore<D>>() {
            let others = J::storages(&self.storages);
            for (entity, component) in driver.iter_mut() {
                let Some(record) = self.entities.get(entity) else {
                    continue;
                };
                if !record.is_active {
                    continue;
                }
                if let Some(rest) = J::fetch(others, entity) {
                    f(entity, record, component, rest);
                }
            }
        }

        self.storages.put_back(index, storage);
    }

    /// Calls `f` for every live `T`, active or not.
    pub fn for_each_component<T, F>(&self, mut f: F)
    where
        T: Component,
        F: FnMut(HEntity, &T),
    {
        if let Some(store) = self.storages.store::<T>() {
            for (entity, component) in store.iter() {
                f(entity, component);
            }
        }
    }

    /// Calls `f` for every live `T`, mutably.
    pub fn for_each_component_mut<T, F>(&mut self, mut f: F)
    where
        T: Component,
        F: FnMut(HEntity, &mut T),
    {
        if let Some(store) = self.storages.store_mut::<T>() {
            for (entity, component) in store.iter_mut() {
                f(entity, component);
            }
        }
    }

    // =========================================================================
    // LEVELS
    // =========================================================================

    /// Creates an empty level. Fails if `id` is taken.
    ///
    /// `interactive_bounds` defaults to `bounds`, depth 0 to the default
    /// subdivision depth.
    pub fn create_level(
        &mut self,
        id: StrId,
        bounds: Aabb,
        interactive_bounds: Option<Aabb>,
        subdivision_depth: u32,
    ) -> Option<&mut GameLevel> {
        let depth = if subdivision_depth == 0 {
            DEFAULT_SUBDIVISION_DEPTH
        } else {
            subdivision_depth
        };
        let level = GameLevel::new(
            id,
            bounds,
            interactive_bounds.unwrap_or(bounds),
            depth,
            &self.spatial,
        );
        self.insert_level(level)
    }

    /// Builds a level from its description. Fails if `id` is taken.
    ///
    /// Entities listed in the description replace the world contents, as
    /// with [`GameWorld::load_base_params`].
    pub fn load_level(&mut self, id: StrId, desc: &LevelDesc) -> Option<&mut GameLevel> {
        if self.levels.contains_key(&id) {
            tracing::error!("level '{}' already exists", id);
            return None;
        }

        let level = GameLevel::load_from_desc(id, desc, &self.resources, &self.spatial);
        self.levels.insert(id, level);
        tracing::info!("level '{}' loaded", id);

        if let Some(entities) = &desc.entities {
            self.load_base_params(entities);
        }
        self.levels.get_mut(&id)
    }

    fn insert_level(&mut self, level: GameLevel) -> Option<&mut GameLevel> {
        match self.levels.entry(level.id()) {
            Entry::Occupied(_) => {
                tracing::error!("level '{}' already exists", level.id());
                None
            }
            Entry::Vacant(slot) => Some(slot.insert(level)),
        }
    }

    /// Level `id`.
    #[must_use]
    pub fn find_level(&self, id: StrId) -> Option<&GameLevel> {
        self.levels.get(&id)
    }

    /// Mutable level `id`.
    pub fn find_level_mut(&mut self, id: StrId) -> Option<&mut GameLevel> {
        self.levels.get_mut(&id)
    }

    /// All levels by id.
    pub fn levels(&self) -> impl Iterator<Item = &GameLevel> + '_ {
        self.levels.values()
    }

    /// Validates level `id` and the components of its entities. Returns
    /// how many components became valid.
    pub fn validate_level(&mut self, id: StrId) -> usize {
        if let Some(level) = self.levels.get_mut(&id) {
            if !level.validate(&self.resources) {
                tracing::warn!("level '{}' has unresolved resources", id);
            }
        }

        let mut count = 0;
        for storage in self.storages.iter_mut() {
            count += storage.validate_components(id, &self.entities);
        }
        tracing::debug!("level '{}': {} components validated", id, count);
        count
    }

    /// Releases runtime resources of the components of entities in `id`.
    pub fn invalidate_level(&mut self, id: StrId) -> usize {
        let mut count = 0;
        for storage in self.storages.iter_mut() {
            count += storage.invalidate_components(id, &self.entities);
        }
        count
    }
}

impl fmt::Debug for GameWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameWorld")
            .field("state", &self.state)
            .field("entities", &self.entities.len())
            .field("base_entities", &self.entities_base.len())
            .field("storages", &self.storages)
            .field("levels", &self.levels.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
