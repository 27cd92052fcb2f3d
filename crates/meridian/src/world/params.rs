//! # Params World Format
//!
//! Unlike the binary format, params store the world per entity:
//!
//! ```json
//! {
//!   "__4294967296": { "Level": "Harbor", "Position": { "x": 1.0 } },
//!   "__8589934593": null
//! }
//! ```
//!
//! Keys are `"__"` plus the decimal raw handle. Inside an entity, a
//! component key missing means unchanged, `null` means removed, anything
//! else is merged over the component. A `null` entity in a diff deletes
//! it. Params have no separate base layer; loading them as base fills the
//! actual state directly.

use super::{GameWorld, WorldState};
use meridian_core::{Entity, HEntity};
use meridian_shared::{Data, Params, StrId};

impl GameWorld {
    /// Replaces the world contents with the entities in `params`.
    ///
    /// Editor and debug path: there's no base afterwards, so a later diff
    /// save writes everything. The world ends up in
    /// [`WorldState::Stopped`].
    pub fn load_base_params(&mut self, params: &Params) {
        self.clear_all(params.len());

        let mut loaded = 0;
        for (key, data) in params.iter() {
            if self.load_entity_from_params(*key, data, false) {
                loaded += 1;
            }
        }

        self.state = WorldState::Stopped;
        tracing::info!("world params loaded: {} of {} entities", loaded, params.len());
    }

    /// Rebuilds the actual state as base plus the per-entity diff in
    /// `params`. The world ends up in [`WorldState::Stopped`].
    pub fn load_diff_params(&mut self, params: &Params) {
        self.copy_base_to_actual();

        for (key, data) in params.iter() {
            if data.is_void() {
                match HEntity::from_key(key.as_str()) {
                    Some(entity) => {
                        self.delete_entity(entity);
                    }
                    None => tracing::warn!("bad entity key '{}' in world diff", key),
                }
            } else {
                self.load_entity_from_params(*key, data, true);
            }
        }

        self.state = WorldState::Stopped;
    }

    /// Loads one `"__raw": { ... }` entry. In a diff, an existing entity
    /// is patched in place; otherwise the entity is created at its handle.
    fn load_entity_from_params(&mut self, key: StrId, data: &Data, diff: bool) -> bool {
        let Some(entity) = HEntity::from_key(key.as_str()).filter(|e| e.is_valid()) else {
            tracing::warn!("bad entity key '{}'", key);
            return false;
        };
        let Some(desc) = data.as_params() else {
            tracing::warn!("entity '{}' is not a params section", key);
            return false;
        };

        let exists = diff && self.entities.contains(entity);
        if !exists && !self.entities.allocate_with_handle(entity, Entity::default()) {
            tracing::warn!("entity '{}' conflicts with an existing entity", key);
            return false;
        }

        let Some(record) = self.entities.get_mut(entity) else {
            return false;
        };
        record.apply_params(desc);
        let template_id = record.template_id;

        for (name, component) in desc.iter() {
            let Some(storage) = self.storages.by_name_mut(*name) else {
                continue;
            };
            if component.is_void() {
                storage.remove_component(entity);
            } else if !storage.add_from_params(entity, component) {
                tracing::warn!("entity '{}': component '{}' rejected", key, name);
            }
        }

        self.instantiate_template(entity, template_id, false, false);
        true
    }

    /// Whole actual state, one entry per entity.
    ///
    /// `None` while the actual state isn't built yet.
    #[must_use]
    pub fn save_all_params(&self) -> Option<Params> {
        if self.state == WorldState::BaseLoaded {
            return None;
        }

        let mut out = Params::with_capacity(self.entities.len());
        for (entity, record) in self.entities.iter() {
            self.save_entity_to_params(&mut out, entity, record, None);
        }
        Some(out)
    }

    /// Difference between the actual state and base, one entry per
    /// changed entity. Deleted entities are written as `null`.
    ///
    /// `None` while the actual state isn't built yet.
    #[must_use]
    pub fn save_diff_params(&self) -> Option<Params> {
        if self.state == WorldState::BaseLoaded {
            return None;
        }

        let mut out = Params::new();
        for (entity, _) in self.entities_base.iter() {
            if !self.entities.contains(entity) {
                out.set(StrId::new(&entity.to_key()), Data::Void);
            }
        }
        for (entity, record) in self.entities.iter() {
            self.save_entity_to_params(&mut out, entity, record, self.entities_base.get(entity));
        }
        Some(out)
    }

    /// Writes the full entity, or only what changed against `base`.
    /// Returns false if a diff was asked for and nothing changed.
    fn save_entity_to_params(
        &self,
        out: &mut Params,
        entity: HEntity,
        record: &Entity,
        base: Option<&Entity>,
    ) -> bool {
        let mut desc = match base {
            Some(base) => {
                debug_assert_eq!(
                    record.template_id, base.template_id,
                    "entity template must never change at runtime"
                );
                record.to_params_diff(base)
            }
            None => record.to_params(),
        };

        let template = self.resolve_template(record.template_id);

        for (name, storage) in self.storages.iter() {
            let template_data = template.as_deref().and_then(|t| t.component(name));
            let component = if base.is_some() {
                storage.save_component_diff_to_params(entity, template_data)
            } else {
                // A templated component the entity lost is written as void
                storage
                    .save_component_to_params(entity)
                    .or_else(|| template_data.map(|_| Data::Void))
            };
            if let Some(component) = component {
                desc.set(name, component);
            }
        }

        if base.is_some() && desc.is_empty() {
            return false;
        }
        out.set(StrId::new(&entity.to_key()), desc);
        true
    }
}
